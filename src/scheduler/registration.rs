use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::error::SchedulerError;

pub const DEFAULT_KEY: &str = "location-tracking";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_FLEX: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Constraints {
    pub requires_network: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            requires_network: true,
        }
    }
}

/// A periodic job registration. The key is unique: registering the same key again
/// replaces the previous registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub key: String,
    pub interval: Duration,
    pub flex: Duration,
    pub constraints: Constraints,
}

impl Registration {
    pub fn periodic(
        key: impl Into<String>,
        interval: Duration,
        flex: Duration,
    ) -> Result<Self, SchedulerError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(SchedulerError::EmptyKey);
        }
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        if flex > interval {
            return Err(SchedulerError::FlexTooLarge { interval, flex });
        }

        Ok(Self {
            key,
            interval,
            flex,
            constraints: Constraints::default(),
        })
    }

    pub fn with_network_required(mut self, requires_network: bool) -> Self {
        self.constraints.requires_network = requires_network;
        self
    }

    /// Wait until the next regular run: somewhere in the last `flex` of the interval.
    pub fn next_delay(&self) -> Duration {
        let earliest = self.interval.saturating_sub(self.flex);
        let flex_ms = self.flex.as_millis() as u64;
        if flex_ms == 0 {
            return earliest;
        }
        earliest + Duration::from_millis(rand::thread_rng().gen_range(0..=flex_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScheduleState {
    Unregistered,
    Registered {
        registration: Registration,
        instance: Uuid,
        since: DateTime<Utc>,
    },
    Cancelled {
        at: DateTime<Utc>,
    },
}

impl ScheduleState {
    pub fn is_registered(&self) -> bool {
        matches!(self, ScheduleState::Registered { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterResult {
    Registered,
    Replaced,
}
