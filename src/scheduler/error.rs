use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("registration key must not be empty")]
    EmptyKey,
    #[error("interval must be positive")]
    ZeroInterval,
    #[error("flex window {flex:?} exceeds interval {interval:?}")]
    FlexTooLarge { interval: Duration, flex: Duration },
    #[error("no active registration for {0}")]
    NotRegistered(String),
}
