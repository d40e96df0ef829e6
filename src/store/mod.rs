mod error;
mod queue;
mod storage;

pub use error::StoreError;
pub use queue::PendingQueue;
pub use storage::{LastKnownPosition, SampleStore, DEFAULT_QUEUE_CAPACITY};
