//! V1 legacy backup format
//!
//! The oldest backups are a bare JSON array of `[key, value]` pairs with no
//! marker; anything whose first four bytes match neither newer marker is
//! treated as V1. The format is read-only.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::backends::{BackupReader, Instruction, InstructionIter, ProducerSend};
use crate::error::{BackupError, Result};
use crate::key_format::KeyFormat;

pub struct SchemaBackupV1Reader {
    key_format: KeyFormat,
}

impl SchemaBackupV1Reader {
    pub fn new(key_format: KeyFormat) -> Self {
        Self { key_format }
    }
}

/// Entries were written either as embedded JSON strings or inline objects,
/// depending on the tool version that produced the file
fn entry_bytes(value: &Value) -> Result<Option<Vec<u8>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone().into_bytes())),
        other => Ok(Some(serde_json::to_vec(other)?)),
    }
}

impl BackupReader for SchemaBackupV1Reader {
    fn read(&self, path: &Path, topic_name: &str) -> Result<InstructionIter> {
        let text = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&text)
            .map_err(|e| BackupError::Corrupt(format!("legacy backup is not JSON: {e}")))?;
        let Value::Array(entries) = document else {
            return Err(BackupError::Corrupt(
                "legacy backup is not a JSON array".to_string(),
            ));
        };

        let mut instructions = vec![Instruction::RestoreTopic {
            name: topic_name.to_string(),
        }];
        for entry in &entries {
            let Some([key, value]) = entry.as_array().and_then(|pair| <&[Value; 2]>::try_from(pair.as_slice()).ok()) else {
                return Err(BackupError::Corrupt(
                    "legacy backup entry is not a [key, value] pair".to_string(),
                ));
            };
            let key = match entry_bytes(key)? {
                Some(raw) => Some(self.key_format.apply(&raw)),
                None => None,
            };
            instructions.push(Instruction::Send(Box::new(ProducerSend {
                topic_name: topic_name.to_string(),
                partition_index: 0,
                key,
                value: entry_bytes(value)?,
                headers: Vec::new(),
                timestamp_ms: None,
            })));
        }
        Ok(Box::new(instructions.into_iter().map(Ok)))
    }
}
