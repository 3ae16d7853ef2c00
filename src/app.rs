//! Interactive attendance flow.
//!
//! `App` ties the pieces together: a check-in/check-out first asks the
//! geofence evaluator to authorize the action from the current device
//! position, and only then issues the mutation through the cache
//! manager, which queues it for replay if the network is down.
//!
//! Geofence denial and location failure are two distinct user-facing
//! messages; an unknown position always blocks. Overlapping attendance
//! calls from the same control are refused while one is in flight.

use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::AttendanceApi;
use crate::auth::{Session, SessionData};
use crate::cache::{CacheManager, CacheStore, MutationOutcome, SyncReport};
use crate::config::Config;
use crate::geofence::OfficeZone;
use crate::location::{acquire_position, LocationError, LocationProvider, PositionOptions};
use crate::models::{AttendanceRecord, RecordType};

/// HTTP request timeout in seconds.
/// Long enough for a slow mobile uplink, short enough to fail over to
/// the offline queue promptly.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shown when the position provider is denied, unsupported, or times out.
pub const MSG_LOCATION_UNAVAILABLE: &str = "위치 정보를 가져올 수 없습니다.";

/// Shown when the position is known but outside the office radius.
pub const MSG_OUTSIDE_OFFICE: &str = "회사 위치에서만 출퇴근이 가능합니다.";

/// Generic retry prompt for interactive network failures.
pub const MSG_RETRY: &str = "처리 중 오류가 발생했습니다.";

#[derive(Debug)]
pub enum BlockReason {
    LocationUnavailable(LocationError),
    OutsideOffice { distance_meters: f64 },
}

#[derive(Debug)]
pub enum AttendanceOutcome {
    /// The API confirmed the event.
    Recorded(RecordType),
    /// Offline; the mutation is queued and will replay on sync.
    Queued(RecordType),
    /// The API answered with an error status.
    Rejected { status: u16, message: &'static str },
    /// The geofence gate refused; nothing was sent.
    Blocked {
        reason: BlockReason,
        message: &'static str,
    },
    /// Another attendance action is still in flight.
    Busy,
}

pub struct App {
    config: Config,
    api: AttendanceApi,
    manager: CacheManager,
    session: Session,
    zone: OfficeZone,
    in_flight: Mutex<()>,
}

impl App {
    pub fn new(config: Config, cache_root: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let store = CacheStore::new(cache_root.join("sets"))?;
        let manager = CacheManager::open(
            store,
            client.clone(),
            &config.api_base_url,
            &config.static_assets,
            config.cache_version,
            config.dynamic_max_entries,
        )?;

        let mut session = Session::new(cache_root);
        let _ = session.load();

        let mut api = AttendanceApi::new(client, config.api_base_url.clone());
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        let zone = config.office;
        Ok(Self {
            config,
            api,
            manager,
            session,
            zone,
            in_flight: Mutex::new(()),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_valid()
    }

    pub fn cache_manager(&self) -> &CacheManager {
        &self.manager
    }

    /// Authenticate and persist the session.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let data: SessionData = self.api.login(username, password).await?;
        self.api.set_token(data.token.clone());
        self.session.update(data);
        self.session.save()?;

        self.config.last_username = Some(username.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to persist last username");
        }
        Ok(())
    }

    /// Run one geofence-gated attendance action.
    pub async fn attendance<P: LocationProvider>(
        &self,
        kind: RecordType,
        provider: &P,
    ) -> Result<AttendanceOutcome> {
        // Refuse overlapping actions from the same control.
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(AttendanceOutcome::Busy),
        };

        let opts = PositionOptions::default();
        let position = acquire_position(provider, &opts).await;
        let verdict = self.zone.evaluate_result(position);

        if let Some(error) = verdict.error {
            info!(?error, "Attendance blocked: position unavailable");
            return Ok(AttendanceOutcome::Blocked {
                reason: BlockReason::LocationUnavailable(error),
                message: MSG_LOCATION_UNAVAILABLE,
            });
        }
        if !verdict.within_zone {
            info!(
                distance_meters = verdict.distance_meters,
                "Attendance blocked: outside office zone"
            );
            return Ok(AttendanceOutcome::Blocked {
                reason: BlockReason::OutsideOffice {
                    distance_meters: verdict.distance_meters,
                },
                message: MSG_OUTSIDE_OFFICE,
            });
        }

        let request = self
            .api
            .mutation_request(kind)
            .context("Not logged in")?;
        match self.manager.dispatch_mutation(request).await? {
            MutationOutcome::Sent(response) if response.is_success() => {
                info!(kind = kind.display_name(), "Attendance recorded");
                Ok(AttendanceOutcome::Recorded(kind))
            }
            MutationOutcome::Sent(response) => {
                warn!(status = response.status, "Attendance mutation rejected");
                Ok(AttendanceOutcome::Rejected {
                    status: response.status,
                    message: MSG_RETRY,
                })
            }
            MutationOutcome::Queued => Ok(AttendanceOutcome::Queued(kind)),
        }
    }

    /// Attendance history through the network-first strategy, so the
    /// last good copy still renders offline.
    pub async fn records(&self) -> Result<Vec<AttendanceRecord>> {
        let request = self.api.records_request().context("Not logged in")?;
        let response = self.manager.fetch(&request).await?;
        self.api.parse_records(&response)
    }

    /// Replay queued mutations (connectivity-restored trigger).
    pub async fn sync(&self) -> Result<SyncReport> {
        Ok(self.manager.sync_attendance().await?)
    }

    /// Install the configured static asset set and activate it.
    pub async fn install_cache(&mut self) -> Result<()> {
        self.manager.install().await?;
        self.manager.activate()?;
        Ok(())
    }
}
