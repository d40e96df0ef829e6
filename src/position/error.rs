use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("no position fix within {0:?}")]
    Timeout(Duration),
    #[error("location provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("track file error: {0}")]
    TrackIo(#[from] std::io::Error),
    #[error("track parse error: {0}")]
    TrackParse(#[from] serde_yaml::Error),
    #[error("track is empty")]
    EmptyTrack,
}
