//! Backup error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our BackupError type
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors raised while creating or restoring backups
#[derive(Error, Debug)]
pub enum BackupError {
    /// Backup location does not exist on restore
    #[error("backup location {0:?} doesn't exist")]
    LocationNotFound(PathBuf),

    /// Restoring from stdin is not supported
    #[error("cannot restore backups from stdin")]
    StdinUnsupported,

    /// V3 backups cannot be written to stdout
    #[error("backup format version 3 does not support writing to stdout")]
    StdoutUnsupported,

    /// The legacy V1 format is read-only
    #[error("cannot produce backups in format version 1")]
    V1NotWritable,

    /// Only single-partition topics can be backed up
    #[error(
        "topic {topic:?} has {partition_count} partitions, but only topics with exactly 1 \
         partition can be backed up; the schemas topic MUST have exactly 1 partition to \
         ensure perfect ordering of schema updates"
    )]
    PartitionCount { topic: String, partition_count: usize },

    /// Nothing to back up; create() recovers from this with a warning
    #[error("topic partition {topic}:{partition} is empty")]
    EmptyPartition { topic: String, partition: i32 },

    /// A poll returned nothing before the target offset was reached
    #[error(
        "consumer of topic partition {topic}:{partition} returned no records within \
         {poll_timeout:?} before the target offset was reached \
         (offsets {start_offset}..={end_offset}, last consumed {last_offset})"
    )]
    StaleConsumer {
        topic: String,
        partition: i32,
        start_offset: i64,
        end_offset: i64,
        last_offset: i64,
        poll_timeout: Duration,
    },

    /// A backend emitted a producer send before restoring a topic
    #[error("backend has not yet restored a topic")]
    MissingRestoreTopic,

    /// The output file exists and overwriting was not requested
    #[error("refusing to overwrite existing file {0:?}")]
    FileExists(PathBuf),

    /// The backup file is malformed
    #[error("invalid backup file: {0}")]
    Corrupt(String),

    /// Producing a restored record failed
    #[error("error while producing restored messages: {0}")]
    ProducerDelivery(rdkafka::error::KafkaError),

    /// Kafka client error
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
