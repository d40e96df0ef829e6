use serde::Deserialize;
use std::time::Duration;

use crate::config::deserialize_duration;

pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5 * 60 * 60);

/// Wait before the next attempt after a cycle asked for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    Exponential {
        #[serde(default = "default_initial", deserialize_with = "deserialize_duration")]
        initial: Duration,
        #[serde(default = "default_max", deserialize_with = "deserialize_duration")]
        max: Duration,
    },
    Linear {
        #[serde(default = "default_initial", deserialize_with = "deserialize_duration")]
        initial: Duration,
        #[serde(default = "default_max", deserialize_with = "deserialize_duration")]
        max: Duration,
    },
}

fn default_initial() -> Duration {
    DEFAULT_BACKOFF_INITIAL
}

fn default_max() -> Duration {
    DEFAULT_BACKOFF_MAX
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            initial: DEFAULT_BACKOFF_INITIAL,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based). Attempt 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let n = attempt.max(1);
        match *self {
            BackoffPolicy::Exponential { initial, max } => 1u32
                .checked_shl(n - 1)
                .and_then(|factor| initial.checked_mul(factor))
                .map_or(max, |d| d.min(max)),
            BackoffPolicy::Linear { initial, max } => {
                initial.checked_mul(n).map_or(max, |d| d.min(max))
            }
        }
    }

    pub fn initial(&self) -> Duration {
        match *self {
            BackoffPolicy::Exponential { initial, .. } | BackoffPolicy::Linear { initial, .. } => {
                initial
            }
        }
    }

    pub fn max(&self) -> Duration {
        match *self {
            BackoffPolicy::Exponential { max, .. } | BackoffPolicy::Linear { max, .. } => max,
        }
    }
}
