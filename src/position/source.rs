use chrono::Utc;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use super::error::PositionError;
use super::provider::LocationProvider;
use super::types::{PositionFix, Priority, UpdateRequest};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_ACCURACY_M: f64 = 50.0;
pub const DEFAULT_MAX_CACHED_AGE: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Acquires a single position fix under an accuracy/deadline policy.
pub struct PositionSource {
    provider: Arc<dyn LocationProvider>,
    max_cached_age: Duration,
    poll_interval: Duration,
}

impl PositionSource {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self {
            provider,
            max_cached_age: DEFAULT_MAX_CACHED_AGE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_max_cached_age(mut self, max_cached_age: Duration) -> Self {
        self.max_cached_age = max_cached_age;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Return a fix no worse than `min_accuracy_m` if one arrives before `deadline`,
    /// otherwise the most accurate fix seen (cached fix included).
    ///
    /// A cached platform fix younger than the max cached age and strictly better than
    /// `min_accuracy_m` is returned without subscribing. The subscription is released
    /// on every return path and when this future is dropped.
    pub async fn acquire(
        &self,
        deadline: Duration,
        min_accuracy_m: f64,
    ) -> Result<PositionFix, PositionError> {
        let until = Instant::now() + deadline;
        let cached = self.provider.last_fix();

        if let Some(fix) = &cached {
            if self.is_fresh(fix) && fix.accuracy_m < min_accuracy_m {
                debug!(
                    "using cached fix ({:.1} m, {} ms old)",
                    fix.accuracy_m,
                    fix.age_at(Utc::now()).num_milliseconds()
                );
                return Ok(fix.clone());
            }
        }

        let request = UpdateRequest {
            priority: Priority::HighAccuracy,
            interval: self.poll_interval,
        };
        let mut stream = match self.provider.subscribe(request) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("location subscription refused: {}", e);
                return cached.ok_or(e);
            }
        };

        let mut best = cached;
        loop {
            let update = match timeout_at(until, stream.next()).await {
                Ok(Some(fix)) => fix,
                Ok(None) | Err(_) => break,
            };

            if update.accuracy_m <= min_accuracy_m {
                debug!("fresh fix accepted ({:.1} m)", update.accuracy_m);
                return Ok(update);
            }

            best = match best {
                Some(current) if current.accuracy_m <= update.accuracy_m => Some(current),
                _ => Some(update),
            };
        }

        match best {
            Some(fix) => {
                debug!(
                    "deadline reached, using best available fix ({:.1} m)",
                    fix.accuracy_m
                );
                Ok(fix)
            }
            None => Err(PositionError::Timeout(deadline)),
        }
    }

    fn is_fresh(&self, fix: &PositionFix) -> bool {
        fix.age_at(Utc::now())
            .to_std()
            .map(|age| age < self.max_cached_age)
            // negative age: stamped in the future
            .unwrap_or(true)
    }
}
