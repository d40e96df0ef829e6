use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::position::{PositionFix, SampleKind};

/// Request body accepted by the collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePayload {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    pub kind: SampleKind,
    pub captured_at: DateTime<Utc>,
}

impl From<&PositionFix> for SamplePayload {
    fn from(fix: &PositionFix) -> Self {
        SamplePayload {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy_m,
            speed: fix.speed_mps,
            kind: fix.kind,
            captured_at: fix.captured_at,
        }
    }
}

/// Why a submission should be retried later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientReason {
    Network,
    Timeout,
    Server(u16),
    Unauthorized(u16),
    RateLimited,
    /// No usable token from the session collaborator; nothing was sent.
    MissingToken,
    Unexpected(u16),
}

impl TransientReason {
    /// Credentials problems that will not fix themselves within one cycle.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            TransientReason::Unauthorized(_) | TransientReason::MissingToken
        )
    }
}

impl fmt::Display for TransientReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientReason::Network => write!(f, "network failure"),
            TransientReason::Timeout => write!(f, "timed out"),
            TransientReason::Server(status) => write!(f, "server error {}", status),
            TransientReason::Unauthorized(status) => write!(f, "unauthorized ({})", status),
            TransientReason::RateLimited => write!(f, "rate limited"),
            TransientReason::MissingToken => write!(f, "no access token"),
            TransientReason::Unexpected(status) => write!(f, "unexpected status {}", status),
        }
    }
}

/// Result of submitting one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ack,
    RejectPermanent { status: u16, message: String },
    RejectTransient(TransientReason),
}

impl SubmitOutcome {
    pub fn is_transient(&self) -> bool {
        matches!(self, SubmitOutcome::RejectTransient(_))
    }
}
