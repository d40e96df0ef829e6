use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use super::error::PositionError;
use super::provider::{spawn_emitter, FixStream, LocationProvider};
use super::types::{PositionFix, UpdateRequest};

/// One point of a recorded track.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    #[serde(default)]
    pub speed_mps: f64,
}

#[derive(Debug)]
struct ReplayState {
    cursor: usize,
    last: Option<PositionFix>,
}

/// Steps through a recorded track, one waypoint per published update.
///
/// The track loops once exhausted. Every published fix is stamped with the wall clock at
/// publication time and becomes the provider's `last_fix`.
#[derive(Debug, Clone)]
pub struct ReplayProvider {
    waypoints: Arc<Vec<Waypoint>>,
    state: Arc<Mutex<ReplayState>>,
    started: Instant,
}

impl ReplayProvider {
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, PositionError> {
        if waypoints.is_empty() {
            return Err(PositionError::EmptyTrack);
        }
        Ok(Self {
            waypoints: Arc::new(waypoints),
            state: Arc::new(Mutex::new(ReplayState {
                cursor: 0,
                last: None,
            })),
            started: Instant::now(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, PositionError> {
        let content = std::fs::read_to_string(path)?;
        let waypoints: Vec<Waypoint> = serde_yaml::from_str(&content)?;
        log::info!(
            "Loaded replay track {} ({} waypoints)",
            path.display(),
            waypoints.len()
        );
        Self::new(waypoints)
    }

    fn advance(&self) -> PositionFix {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let point = &self.waypoints[state.cursor % self.waypoints.len()];
        state.cursor = (state.cursor + 1) % self.waypoints.len();

        let fix = PositionFix::new(point.latitude, point.longitude, point.accuracy_m, Utc::now())
            .with_speed(point.speed_mps)
            .with_monotonic_ms(self.started.elapsed().as_millis() as u64);
        state.last = Some(fix.clone());
        fix
    }
}

impl LocationProvider for ReplayProvider {
    fn last_fix(&self) -> Option<PositionFix> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone()
    }

    fn subscribe(&self, request: UpdateRequest) -> Result<FixStream, PositionError> {
        let provider = self.clone();
        Ok(spawn_emitter(request, move || Some(provider.advance())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Priority;
    use std::time::Duration;

    const TRACK: &str = r#"
- latitude: 52.3700
  longitude: 4.8900
  accuracy_m: 8
- latitude: 52.3710
  longitude: 4.8900
  accuracy_m: 6
  speed_mps: 1.4
"#;

    #[test]
    fn rejects_empty_track() {
        assert!(matches!(
            ReplayProvider::new(Vec::new()),
            Err(PositionError::EmptyTrack)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn replays_waypoints_in_order_and_loops() {
        let waypoints: Vec<Waypoint> = serde_yaml::from_str(TRACK).unwrap();
        let provider = ReplayProvider::new(waypoints).unwrap();
        assert!(provider.last_fix().is_none());

        let mut stream = provider
            .subscribe(UpdateRequest {
                priority: Priority::HighAccuracy,
                interval: Duration::from_secs(1),
            })
            .unwrap();

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        let third = stream.next().await.unwrap();
        assert_eq!(first.latitude, 52.3700);
        assert_eq!(second.latitude, 52.3710);
        assert_eq!(second.speed_mps, 1.4);
        assert_eq!(third.latitude, 52.3700);

        drop(stream);
        assert!(provider.last_fix().is_some());
    }
}
