use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {record}: {source}")]
    Io {
        record: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record {record}: {source}")]
    Corrupt {
        record: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {record}: {source}")]
    Encode {
        record: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("queue capacity must be at least 1")]
    InvalidCapacity,
}

impl StoreError {
    pub(super) fn io(record: &str, source: std::io::Error) -> Self {
        StoreError::Io {
            record: record.to_string(),
            source,
        }
    }
}
