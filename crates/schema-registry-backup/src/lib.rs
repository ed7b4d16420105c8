//! # Schema Registry Backup
//!
//! Creation and restoration of schemas-topic backups in three on-disk
//! formats. The first four bytes of a file identify its format: `/V3\n` for
//! the framed binary format, `/V2\n` for the textual format, anything else
//! is the legacy read-only V1 format.
//!
//! Creation consumes the single partition of the schemas topic from its
//! start offset up to the high watermark; restoration replays an instruction
//! stream produced by the format's reader into a freshly ensured topic.

pub mod api;
pub mod backends;
pub mod error;
mod kafka;
pub mod key_format;
pub mod poll_timeout;
pub mod version;

pub use api::{BackupLocation, SchemaBackup};
pub use backends::{
    safe_writer, BackupMetadata, BackupReader, BackupWriter, ConsumedRecord, DataFile,
    Instruction, ProducerSend, RecordHeader,
};
pub use error::{BackupError, Result};
pub use key_format::KeyFormat;
pub use poll_timeout::PollTimeout;
pub use version::BackupVersion;
