mod client;
mod error;
mod types;

pub use client::{EnvToken, SampleSink, StaticToken, TokenProvider, UploadClient, DEFAULT_TIMEOUT};
pub use error::{classify_status, classify_transport, StatusClass, UploadError};
pub use types::{SamplePayload, SubmitOutcome, TransientReason};
