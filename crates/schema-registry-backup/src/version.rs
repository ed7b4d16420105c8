//! Backup format versions and identification

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;

use crate::backends::v1::SchemaBackupV1Reader;
use crate::backends::v2::{AnonymizeAvroWriter, SchemaBackupV2Reader, SchemaBackupV2Writer, V2_MARKER};
use crate::backends::v3::{SchemaBackupV3Reader, SchemaBackupV3Writer, V3_MARKER};
use crate::backends::{BackupReader, BackupWriter};
use crate::error::{BackupError, Result};
use crate::key_format::KeyFormat;

/// On-disk backup format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupVersion {
    /// V2 with deterministic Avro name anonymization
    AnonymizeAvro,
    /// Legacy JSON format, read-only
    V1,
    /// Textual marker + line format
    V2,
    /// Length-framed binary format with a metadata sidecar
    V3,
}

impl BackupVersion {
    /// Identify a backup file from its first four bytes
    ///
    /// Anything carrying neither marker, including files shorter than four
    /// bytes, is legacy V1.
    pub fn identify(path: &Path) -> Result<BackupVersion> {
        let mut file = File::open(path)?;
        let mut marker = [0u8; 4];
        match file.read_exact(&mut marker) {
            Ok(()) if &marker == V3_MARKER => Ok(BackupVersion::V3),
            Ok(()) if &marker == V2_MARKER => Ok(BackupVersion::V2),
            Ok(()) => Ok(BackupVersion::V1),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(BackupVersion::V1),
            Err(e) => Err(e.into()),
        }
    }

    /// Reader for this format
    pub fn reader(&self, key_format: KeyFormat) -> Box<dyn BackupReader> {
        match self {
            BackupVersion::V3 => Box::new(SchemaBackupV3Reader::new()),
            BackupVersion::V2 | BackupVersion::AnonymizeAvro => {
                Box::new(SchemaBackupV2Reader::new(key_format))
            }
            BackupVersion::V1 => Box::new(SchemaBackupV1Reader::new(key_format)),
        }
    }

    /// Writer for this format; V1 backups cannot be produced
    pub fn writer(&self, allow_overwrite: bool) -> Result<Box<dyn BackupWriter>> {
        match self {
            BackupVersion::V3 => Ok(Box::new(SchemaBackupV3Writer::new(allow_overwrite))),
            BackupVersion::V2 => Ok(Box::new(SchemaBackupV2Writer::new())),
            BackupVersion::AnonymizeAvro => Ok(Box::new(AnonymizeAvroWriter::new())),
            BackupVersion::V1 => Err(BackupError::V1NotWritable),
        }
    }
}

impl std::fmt::Display for BackupVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupVersion::AnonymizeAvro => write!(f, "anonymize_avro"),
            BackupVersion::V1 => write!(f, "1"),
            BackupVersion::V2 => write!(f, "2"),
            BackupVersion::V3 => write!(f, "3"),
        }
    }
}

impl FromStr for BackupVersion {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1" | "v1" => Ok(BackupVersion::V1),
            "2" | "v2" => Ok(BackupVersion::V2),
            "3" | "v3" => Ok(BackupVersion::V3),
            "anonymize" | "anonymize_avro" => Ok(BackupVersion::AnonymizeAvro),
            other => Err(BackupError::Corrupt(format!(
                "unknown backup version {other:?}"
            ))),
        }
    }
}
