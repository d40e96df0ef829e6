mod backoff;
mod connectivity;
mod error;
mod registration;
mod runner;

pub use backoff::{BackoffPolicy, DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX};
pub use connectivity::{AlwaysOnline, Connectivity, TcpProbe, DEFAULT_PROBE_TIMEOUT};
pub use error::SchedulerError;
pub use registration::{
    Constraints, RegisterResult, Registration, ScheduleState, DEFAULT_FLEX, DEFAULT_INTERVAL,
    DEFAULT_KEY,
};
pub use runner::{CycleOutcome, JobStatus, ScheduledJob, Scheduler};
