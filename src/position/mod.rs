mod error;
mod fixed;
mod provider;
mod replay;
mod source;
mod types;

pub use error::PositionError;
pub use fixed::FixedProvider;
pub use provider::{spawn_emitter, FixPublisher, FixStream, LocationProvider};
pub use replay::{ReplayProvider, Waypoint};
pub use source::{
    PositionSource, DEFAULT_DEADLINE, DEFAULT_MAX_CACHED_AGE, DEFAULT_MIN_ACCURACY_M,
    DEFAULT_POLL_INTERVAL,
};
pub use types::{PositionFix, Priority, SampleKind, UpdateRequest};
