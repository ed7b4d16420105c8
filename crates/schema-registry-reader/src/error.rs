//! Reader error types

use thiserror::Error;

/// Result type alias using our ReaderError type
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors raised while replaying the schemas topic
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Record key is not valid JSON or not a known key shape
    #[error("invalid record key: {0}")]
    InvalidKey(String),

    /// Record value is not valid JSON for its keytype
    #[error("invalid record value: {0}")]
    InvalidValue(String),

    /// The schemas topic does not have exactly one partition
    #[error("schemas topic {topic:?} has {partitions} partitions, but it must have exactly 1 to preserve schema update ordering")]
    PartitionCount { topic: String, partitions: usize },

    /// Kafka client error
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Core registry error
    #[error(transparent)]
    Core(#[from] schema_registry_core::Error),
}
