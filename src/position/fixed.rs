use chrono::Utc;
use std::time::Instant;

use super::error::PositionError;
use super::provider::{spawn_emitter, FixStream, LocationProvider};
use super::types::{PositionFix, UpdateRequest};

/// Provider reporting a constant position, for hosts without a location sensor.
#[derive(Debug, Clone, Copy)]
pub struct FixedProvider {
    latitude: f64,
    longitude: f64,
    accuracy_m: f64,
    started: Instant,
}

impl FixedProvider {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            started: Instant::now(),
        }
    }

    /// Parse `"lat,lon"`.
    pub fn from_coordinates(coordinates: &str, accuracy_m: f64) -> Result<Self, PositionError> {
        let invalid = || PositionError::InvalidCoordinates(coordinates.to_string());
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() != 2 {
            return Err(invalid());
        }
        let lat: f64 = parts[0].parse().map_err(|_| invalid())?;
        let lon: f64 = parts[1].parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(invalid());
        }
        Ok(Self::new(lat, lon, accuracy_m))
    }

    fn fix_now(&self) -> PositionFix {
        PositionFix::new(self.latitude, self.longitude, self.accuracy_m, Utc::now())
            .with_monotonic_ms(self.started.elapsed().as_millis() as u64)
    }
}

impl LocationProvider for FixedProvider {
    fn last_fix(&self) -> Option<PositionFix> {
        Some(self.fix_now())
    }

    fn subscribe(&self, request: UpdateRequest) -> Result<FixStream, PositionError> {
        let provider = *self;
        Ok(spawn_emitter(request, move || Some(provider.fix_now())))
    }
}
