use thiserror::Error;

use super::types::TransientReason;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid sink endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("invalid access token format")]
    InvalidToken,
}

/// How the sink's HTTP status should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Accepted,
    Permanent,
    Transient(TransientReason),
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Accepted,
        401 | 403 => StatusClass::Transient(TransientReason::Unauthorized(status)),
        408 => StatusClass::Transient(TransientReason::Timeout),
        429 => StatusClass::Transient(TransientReason::RateLimited),
        400..=499 => StatusClass::Permanent,
        500..=599 => StatusClass::Transient(TransientReason::Server(status)),
        _ => StatusClass::Transient(TransientReason::Unexpected(status)),
    }
}

pub fn classify_transport(err: &reqwest::Error) -> TransientReason {
    if err.is_timeout() {
        TransientReason::Timeout
    } else {
        TransientReason::Network
    }
}
