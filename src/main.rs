//! clockin - a geofence-gated employee attendance client.
//!
//! Check-in/check-out is only permitted near the configured office
//! location, and the client keeps working offline: static assets and
//! API responses serve from a local cache, and failed attendance
//! mutations queue for replay once connectivity returns.

mod api;
mod app;
mod auth;
mod cache;
mod config;
mod geofence;
mod install;
mod location;
mod models;

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, AttendanceOutcome};
use auth::CredentialStore;
use config::Config;
use location::{FileProvider, FixedProvider};
use models::RecordType;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG to control log level (e.g. RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn usage() -> ! {
    eprintln!(
        "Usage: clockin <command>\n\
         \n\
         Commands:\n\
           login <username>        authenticate and save the session\n\
           in  [--lat N --lon N]   check in (geofence-gated)\n\
           out [--lat N --lon N]   check out (geofence-gated)\n\
           records                 show attendance history\n\
           sync                    replay queued attendance mutations\n\
           install-cache           install and activate the static asset cache\n\
           status                  show session and cache state"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::load().context("Failed to load configuration")?;
    let cache_root = config.cache_dir()?;
    let fix_file = config.position_fix_file.clone();
    let mut app = App::new(config, cache_root)?;

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("login") => {
            let username = args.get(2).cloned().unwrap_or_else(|| usage());
            let password = read_password(&username)?;
            app.login(&username, &password).await?;
            println!("Logged in as {}", username);
        }
        Some("in") => run_attendance(&app, RecordType::CheckIn, &args[2..], fix_file).await?,
        Some("out") => run_attendance(&app, RecordType::CheckOut, &args[2..], fix_file).await?,
        Some("records") => {
            let records = app.records().await?;
            if records.is_empty() {
                println!("No attendance records.");
            }
            for record in records {
                println!(
                    "{}  {:<9}  {}",
                    record.timestamp_display(),
                    record.record_type.display_name(),
                    record.employee.name
                );
            }
        }
        Some("sync") => {
            let report = app.sync().await?;
            println!("Replayed {}, still queued {}", report.replayed, report.failed);
        }
        Some("install-cache") => {
            app.install_cache().await?;
            println!("Static cache installed and activated.");
        }
        Some("status") => {
            let manager = app.cache_manager();
            println!(
                "session: {}",
                if app.is_authenticated() { "valid" } else { "none" }
            );
            println!("cache lifecycle: {:?}", manager.lifecycle());
            match manager.active_version() {
                Some(version) => println!("cache version: v{}", version),
                None => println!("cache version: not installed"),
            }
        }
        _ => usage(),
    }

    info!("clockin done");
    Ok(())
}

/// Resolve the position source and run one gated attendance action.
async fn run_attendance(
    app: &App,
    kind: RecordType,
    flags: &[String],
    fix_file: Option<std::path::PathBuf>,
) -> Result<()> {
    let outcome = match parse_coords(flags)? {
        Some((latitude, longitude)) => {
            let provider = FixedProvider { latitude, longitude };
            app.attendance(kind, &provider).await?
        }
        None => match fix_file {
            Some(path) => {
                let provider = FileProvider::new(path);
                app.attendance(kind, &provider).await?
            }
            None => bail!("No position source: pass --lat/--lon or set position_fix_file"),
        },
    };

    match outcome {
        AttendanceOutcome::Recorded(kind) => println!("{} recorded.", kind.display_name()),
        AttendanceOutcome::Queued(kind) => {
            println!("Offline: {} queued, will sync later.", kind.display_name())
        }
        AttendanceOutcome::Rejected { status, message } => {
            println!("{} (HTTP {})", message, status)
        }
        AttendanceOutcome::Blocked { message, .. } => println!("{}", message),
        AttendanceOutcome::Busy => println!("Another attendance action is still running."),
    }
    Ok(())
}

/// Parse optional `--lat N --lon N` flags. Both or neither.
fn parse_coords(flags: &[String]) -> Result<Option<(f64, f64)>> {
    let mut lat = None;
    let mut lon = None;
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .with_context(|| format!("Missing value for {}", flag))?;
        match flag.as_str() {
            "--lat" => lat = Some(value.parse().context("Invalid --lat")?),
            "--lon" => lon = Some(value.parse().context("Invalid --lon")?),
            other => bail!("Unknown flag {}", other),
        }
    }
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(Some((lat, lon))),
        (None, None) => Ok(None),
        _ => bail!("--lat and --lon must be given together"),
    }
}

/// Password from the keychain if saved, otherwise prompted on stdin
/// and offered to the keychain for next time.
fn read_password(username: &str) -> Result<String> {
    if let Some(password) = CredentialStore::lookup(username) {
        return Ok(password);
    }

    eprint!("Password for {}: ", username);
    io::stderr().flush()?;
    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']).to_string();

    if let Err(e) = CredentialStore::remember(username, &password) {
        tracing::debug!(error = %e, "Keychain unavailable, not saving password");
    }
    Ok(password)
}
