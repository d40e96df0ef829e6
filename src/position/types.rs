use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::Display;

/// What a sample was captured for. Only `Tracking` is produced by the periodic pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SampleKind {
    Tracking,
    CheckIn,
    CheckOut,
}

/// A single measured device position.
///
/// Fixes are never mutated after capture; the `with_*` builders consume and return a new
/// value. Two fixes denote the same sample when their capture timestamps are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy_m: f64,
    #[serde(default)]
    pub speed_mps: f64,
    pub captured_at: DateTime<Utc>,
    /// Milliseconds on the provider's monotonic clock.
    #[serde(default)]
    pub monotonic_ms: u64,
    pub kind: SampleKind,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            speed_mps: 0.0,
            captured_at,
            monotonic_ms: 0,
            kind: SampleKind::Tracking,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = speed_mps;
        self
    }

    pub fn with_monotonic_ms(mut self, monotonic_ms: u64) -> Self {
        self.monotonic_ms = monotonic_ms;
        self
    }

    pub fn with_kind(mut self, kind: SampleKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn same_sample(&self, other: &PositionFix) -> bool {
        self.captured_at == other.captured_at
    }

    /// Age relative to `now`. Negative when the fix is stamped in the future.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.captured_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Priority {
    HighAccuracy,
    Balanced,
    LowPower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub priority: Priority,
    pub interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&SampleKind::CheckIn).unwrap();
        assert_eq!(json, "\"check-in\"");
        assert_eq!(SampleKind::CheckOut.to_string(), "check-out");
    }

    #[test]
    fn identity_is_capture_timestamp() {
        let at = Utc::now();
        let a = PositionFix::new(1.0, 2.0, 5.0, at);
        let b = PositionFix::new(3.0, 4.0, 9.0, at).with_kind(SampleKind::CheckIn);
        let c = PositionFix::new(1.0, 2.0, 5.0, at + chrono::Duration::milliseconds(1));
        assert!(a.same_sample(&b));
        assert!(!a.same_sample(&c));
    }
}
