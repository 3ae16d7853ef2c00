//! Geofence evaluation for attendance gating.
//!
//! A check-in or check-out is only permitted when the device sits
//! inside a circular zone around the office. Membership is decided by
//! great-circle distance (haversine) between the reported fix and the
//! zone center. An unknown position is never treated as in-office:
//! provider errors yield a denied result carrying the error.

use serde::{Deserialize, Serialize};

use crate::location::{DevicePosition, LocationError};

/// Mean Earth radius in meters, as used by the haversine formula.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Circular office zone. Injected configuration, one per deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OfficeZone {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GeofenceResult {
    pub within_zone: bool,
    pub distance_meters: f64,
    pub error: Option<LocationError>,
}

/// Great-circle distance in meters between two latitude/longitude pairs.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

impl OfficeZone {
    /// Distance from a position to the zone center, in meters.
    pub fn distance_to(&self, position: &DevicePosition) -> f64 {
        haversine_distance(
            position.latitude,
            position.longitude,
            self.latitude,
            self.longitude,
        )
    }

    /// Decide zone membership for a known position. Pure; the boundary
    /// itself counts as inside.
    pub fn evaluate(&self, position: &DevicePosition) -> GeofenceResult {
        let distance_meters = self.distance_to(position);
        GeofenceResult {
            within_zone: distance_meters <= self.radius_meters,
            distance_meters,
            error: None,
        }
    }

    /// Decide membership for a position fetch that may have failed.
    /// A provider error always denies, with the error preserved so the
    /// caller can surface the right message.
    pub fn evaluate_result(
        &self,
        position: Result<DevicePosition, LocationError>,
    ) -> GeofenceResult {
        match position {
            Ok(position) => self.evaluate(&position),
            Err(error) => GeofenceResult {
                within_zone: false,
                distance_meters: f64::INFINITY,
                error: Some(error),
            },
        }
    }
}
