//! Device position providers.
//!
//! The geofence evaluator needs a current fix; where it comes from is
//! deployment-specific, so the source is abstracted behind
//! `LocationProvider`. Two providers ship with the client:
//!
//! - `FixedProvider`: coordinates supplied on the command line
//! - `FileProvider`: the latest fix written to a JSON file by an
//!   external location agent
//!
//! `acquire_position` wraps any provider with the bounded wait and
//! freshness rules: the await times out after `timeout_ms` and a fix
//! older than `max_age_ms` is rejected as stale.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Allowance for clock skew between the fix writer and this process
/// when judging staleness.
const STALE_TOLERANCE_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DevicePosition {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Options mirroring the usual geolocation API knobs.
#[derive(Debug, Clone, Copy)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    /// Maximum acceptable fix age. 0 means only a fresh fix is accepted.
    pub max_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        // High accuracy, 5 second bound, no cached fixes.
        Self {
            enable_high_accuracy: true,
            timeout_ms: 5_000,
            max_age_ms: 0,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("position unavailable")]
    PositionUnavailable,

    #[error("location permission denied")]
    PermissionDenied,

    #[error("timed out waiting for a position fix")]
    Timeout,

    #[error("no location provider on this platform")]
    Unsupported,
}

pub trait LocationProvider {
    /// Resolve the current device position. Implementations may block on
    /// hardware or IPC; callers bound the wait via `acquire_position`.
    fn current_position(
        &self,
        opts: &PositionOptions,
    ) -> impl std::future::Future<Output = Result<DevicePosition, LocationError>> + Send;
}

/// Fetch a position with the timeout and staleness rules applied.
pub async fn acquire_position<P: LocationProvider>(
    provider: &P,
    opts: &PositionOptions,
) -> Result<DevicePosition, LocationError> {
    let wait = Duration::from_millis(opts.timeout_ms);
    let position = tokio::time::timeout(wait, provider.current_position(opts))
        .await
        .map_err(|_| LocationError::Timeout)??;

    let age_ms = (Utc::now() - position.timestamp).num_milliseconds();
    if age_ms > opts.max_age_ms as i64 + STALE_TOLERANCE_MS {
        debug!(age_ms, max_age_ms = opts.max_age_ms, "Rejecting stale position fix");
        return Err(LocationError::PositionUnavailable);
    }

    Ok(position)
}

/// Provider backed by coordinates handed in directly (CLI flags).
/// The fix is stamped at call time, so it always passes the freshness check.
#[derive(Debug, Clone, Copy)]
pub struct FixedProvider {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationProvider for FixedProvider {
    async fn current_position(
        &self,
        _opts: &PositionOptions,
    ) -> Result<DevicePosition, LocationError> {
        Ok(DevicePosition {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: None,
            timestamp: Utc::now(),
        })
    }
}

/// Provider reading the most recent fix from a JSON file maintained by
/// an external agent (GPS daemon, phone companion app, etc).
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl LocationProvider for FileProvider {
    async fn current_position(
        &self,
        _opts: &PositionOptions,
    ) -> Result<DevicePosition, LocationError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => LocationError::PermissionDenied,
                _ => LocationError::PositionUnavailable,
            })?;

        serde_json::from_str(&contents).map_err(|_| LocationError::PositionUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_fixed_provider_is_always_fresh() {
        let provider = FixedProvider {
            latitude: 36.636736,
            longitude: 127.323375,
        };
        let opts = PositionOptions::default();
        let position = acquire_position(&provider, &opts)
            .await
            .expect("fixed provider should resolve");
        assert_eq!(position.latitude, 36.636736);
        assert!(position.accuracy.is_none());
    }

    #[tokio::test]
    async fn test_file_provider_reads_fix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix.json");
        let fix = DevicePosition {
            latitude: 36.64,
            longitude: 127.32,
            accuracy: Some(12.5),
            timestamp: Utc::now(),
        };
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string(&fix).unwrap().as_bytes())
            .unwrap();

        let provider = FileProvider::new(path);
        let position = acquire_position(&provider, &PositionOptions::default())
            .await
            .expect("file provider should resolve");
        assert_eq!(position.accuracy, Some(12.5));
    }

    #[tokio::test]
    async fn test_stale_fix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix.json");
        let fix = DevicePosition {
            latitude: 36.64,
            longitude: 127.32,
            accuracy: None,
            timestamp: Utc::now() - chrono::Duration::minutes(10),
        };
        std::fs::write(&path, serde_json::to_string(&fix).unwrap()).unwrap();

        let provider = FileProvider::new(path);
        let err = acquire_position(&provider, &PositionOptions::default())
            .await
            .expect_err("ten-minute-old fix must be stale with max_age 0");
        assert_eq!(err, LocationError::PositionUnavailable);
    }

    #[tokio::test]
    async fn test_missing_fix_file_is_unavailable() {
        let provider = FileProvider::new(PathBuf::from("/nonexistent/fix.json"));
        let err = acquire_position(&provider, &PositionOptions::default())
            .await
            .expect_err("missing file must not resolve");
        assert_eq!(err, LocationError::PositionUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        struct NeverResolves;
        impl LocationProvider for NeverResolves {
            async fn current_position(
                &self,
                _opts: &PositionOptions,
            ) -> Result<DevicePosition, LocationError> {
                futures::future::pending().await
            }
        }

        let err = acquire_position(&NeverResolves, &PositionOptions::default())
            .await
            .expect_err("pending provider must hit the 5s bound");
        assert_eq!(err, LocationError::Timeout);
    }
}
