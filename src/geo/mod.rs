use chrono::{DateTime, Duration, Utc};

use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const KM_PER_MILE: f64 = 1.609_344;

/// Distance a driver must cover before a fresh sample is worth sending.
pub const MOVEMENT_THRESHOLD_KM: f64 = 0.1;
/// Longest a stationary driver stays silent.
pub const MAX_SILENCE_MINUTES: i64 = 5;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b) / KM_PER_MILE
}

/// Linear interpolation in lat/lng; `t` is clamped to `[0, 1]` and the
/// endpoints are reproduced exactly.
pub fn interpolate(from: &GeoPoint, to: &GeoPoint, t: f64) -> GeoPoint {
    let t = t.clamp(0.0, 1.0);
    GeoPoint {
        lat: from.lat * (1.0 - t) + to.lat * t,
        lng: from.lng * (1.0 - t) + to.lng * t,
    }
}

/// Decides whether a driver position should be reported: the first
/// observation always passes, later ones pass after moving beyond the
/// threshold or after staying silent too long.
#[derive(Debug, Clone)]
pub struct MovementGate {
    threshold_km: f64,
    max_silence: Duration,
    last_sent: Option<(GeoPoint, DateTime<Utc>)>,
}

impl Default for MovementGate {
    fn default() -> Self {
        Self::new(MOVEMENT_THRESHOLD_KM, Duration::minutes(MAX_SILENCE_MINUTES))
    }
}

impl MovementGate {
    pub fn new(threshold_km: f64, max_silence: Duration) -> Self {
        Self {
            threshold_km,
            max_silence,
            last_sent: None,
        }
    }

    pub fn should_send(&self, point: &GeoPoint, at: DateTime<Utc>) -> bool {
        match &self.last_sent {
            None => true,
            Some((last_point, last_at)) => {
                haversine_km(last_point, point) > self.threshold_km
                    || at - *last_at > self.max_silence
            }
        }
    }

    pub fn record(&mut self, point: GeoPoint, at: DateTime<Utc>) {
        self.last_sent = Some((point, at));
    }
}
