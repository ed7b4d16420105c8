//! Backup backends
//!
//! Every on-disk format implements the same two contracts: a reader turning a
//! file into an instruction stream, and a writer receiving consumed records
//! partition by partition. The orchestrator never knows format details.

pub mod v1;
pub mod v2;
pub mod v3;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};

/// One record consumed from the log, decoupled from the Kafka client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub headers: Vec<RecordHeader>,
    pub timestamp_ms: Option<i64>,
    pub partition: i32,
    pub offset: i64,
}

/// A record header; the key may be null and is preserved as such on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

/// A single producer send during restoration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSend {
    pub topic_name: String,
    pub partition_index: i32,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub headers: Vec<RecordHeader>,
    pub timestamp_ms: Option<i64>,
}

/// Instruction emitted by a backup reader
///
/// `RestoreTopic` must precede any `Send` for that topic; the orchestrator
/// rejects out-of-order streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    RestoreTopic { name: String },
    Send(Box<ProducerSend>),
}

/// Streaming instruction source
pub type InstructionIter = Box<dyn Iterator<Item = Result<Instruction>> + Send>;

/// Turns a backup file into an instruction stream
pub trait BackupReader {
    fn read(&self, path: &Path, topic_name: &str) -> Result<InstructionIter>;
}

/// A finished partition data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub filename: String,
    pub partition: i32,
}

/// Metadata describing a finished backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub topic_name: String,
    #[serde(default)]
    pub topic_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub data_files: Vec<DataFile>,
}

/// Writes consumed records into a backup location
pub trait BackupWriter {
    /// Called once before any partition, e.g. to create directories
    fn prepare_location(&mut self, _topic_name: &str, _location: &Path) -> Result<()> {
        Ok(())
    }

    /// Resolve the file a partition's records are written to
    fn start_partition(
        &mut self,
        location: &Path,
        topic_name: &str,
        index: i32,
    ) -> Result<PathBuf>;

    /// Write the format header at the start of a partition file
    fn write_header(&mut self, out: &mut dyn Write) -> Result<()>;

    /// Serialize one consumed record
    fn store_record(&mut self, out: &mut dyn Write, record: &ConsumedRecord) -> Result<()>;

    /// Close out a partition, returning its data-file entry
    fn finalize_partition(&mut self, index: i32, filename: &str) -> Result<DataFile>;

    /// Persist backup metadata; formats without a sidecar do nothing
    fn store_metadata(&mut self, _location: &Path, _metadata: &BackupMetadata) -> Result<()> {
        Ok(())
    }
}

/// Run `write` against a sibling temp file and atomically rename on success
///
/// On any failure the temp file is removed and the target left untouched.
/// `allow_overwrite` gates the final rename over an existing file.
pub fn safe_writer<T>(
    path: &Path,
    allow_overwrite: bool,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<T>,
) -> Result<T> {
    if !allow_overwrite && path.exists() {
        return Err(BackupError::FileExists(path.to_path_buf()));
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| BackupError::Corrupt(format!("invalid backup path {path:?}")))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let attempt = (|| {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let value = write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(value)
    })();

    match attempt {
        Ok(value) => {
            if !allow_overwrite && path.exists() {
                let _ = fs::remove_file(&tmp_path);
                return Err(BackupError::FileExists(path.to_path_buf()));
            }
            fs::rename(&tmp_path, path)?;
            Ok(value)
        }
        Err(error) => {
            let _ = fs::remove_file(&tmp_path);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_writer_renames_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("backup.log");
        safe_writer(&target, false, |out| {
            out.write_all(b"payload")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");
        assert!(!dir.path().join("backup.log.tmp").exists());
    }

    #[test]
    fn test_safe_writer_removes_temp_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("backup.log");
        let result: Result<()> = safe_writer(&target, false, |out| {
            out.write_all(b"partial")?;
            Err(BackupError::Corrupt("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!target.exists());
        assert!(!dir.path().join("backup.log.tmp").exists());
    }

    #[test]
    fn test_safe_writer_refuses_overwrite_unless_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("backup.log");
        fs::write(&target, b"old").unwrap();

        let refused: Result<()> = safe_writer(&target, false, |out| {
            out.write_all(b"new")?;
            Ok(())
        });
        assert!(matches!(refused, Err(BackupError::FileExists(_))));
        assert_eq!(fs::read(&target).unwrap(), b"old");

        safe_writer(&target, true, |out| {
            out.write_all(b"new")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }
}
