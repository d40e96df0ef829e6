use crate::position::PositionFix;

pub const DEFAULT_MOVEMENT_THRESHOLD_M: f64 = 30.0;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Decides whether a fix moved far enough from the last accepted one to be worth keeping.
/// Only spatial distance matters; timestamps are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deduplicator {
    threshold_m: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_MOVEMENT_THRESHOLD_M)
    }
}

impl Deduplicator {
    pub fn new(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    pub fn distance_m(a: &PositionFix, b: &PositionFix) -> f64 {
        haversine_distance_m(a.latitude, a.longitude, b.latitude, b.longitude)
    }

    pub fn should_accept(&self, candidate: &PositionFix, last_known: Option<&PositionFix>) -> bool {
        match last_known {
            None => true,
            Some(last) => Self::distance_m(candidate, last) >= self.threshold_m,
        }
    }
}
