//! Log record model
//!
//! Records on the schemas topic carry a JSON key tagged with a `keytype` and
//! an optional JSON value whose shape depends on that tag. Both are parsed
//! once here, at the edge; the state machine only ever sees typed variants.

use serde::{Deserialize, Serialize};

use schema_registry_core::{CompatibilityMode, Version};

use crate::error::{ReaderError, Result};

/// Decoded record key, tagged by `keytype`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "keytype")]
pub enum LogKey {
    /// Compatibility configuration, global when `subject` is absent
    #[serde(rename = "CONFIG")]
    Config {
        #[serde(default)]
        subject: Option<String>,
    },
    /// Schema version registration or tombstone
    #[serde(rename = "SCHEMA")]
    Schema { subject: String, version: Version },
    /// Soft-deletion of a subject up to a version
    #[serde(rename = "DELETE_SUBJECT")]
    DeleteSubject { subject: String },
    /// No-op marker
    #[serde(rename = "NOOP")]
    Noop,
}

/// Value of a CONFIG record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConfigValue {
    #[serde(rename = "compatibilityLevel")]
    pub compatibility_level: CompatibilityMode,
}

/// Value of a SCHEMA record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaValue {
    pub subject: String,
    pub version: Version,
    pub id: u32,
    pub schema: String,
    #[serde(rename = "schemaType", default)]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

/// Value of a DELETE_SUBJECT record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteSubjectValue {
    pub subject: String,
    pub version: Version,
}

/// A fully decoded log record, ready for the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Config {
        subject: Option<String>,
        value: Option<ConfigValue>,
    },
    Schema {
        subject: String,
        version: Version,
        value: Option<SchemaValue>,
    },
    DeleteSubject {
        value: Option<DeleteSubjectValue>,
    },
    Noop,
}

impl LogRecord {
    /// Decode a raw key/value pair
    ///
    /// An absent or empty value is a tombstone. Any JSON failure is an error
    /// for the caller to log and skip; skipping never fails replay.
    pub fn decode(key: &[u8], value: Option<&[u8]>) -> Result<Self> {
        let key: LogKey = serde_json::from_slice(key)
            .map_err(|e| ReaderError::InvalidKey(e.to_string()))?;
        let value = value.filter(|bytes| !bytes.is_empty());

        match key {
            LogKey::Config { subject } => {
                let value = value
                    .map(parse_value::<ConfigValue>)
                    .transpose()?
                    .flatten();
                Ok(LogRecord::Config { subject, value })
            }
            LogKey::Schema { subject, version } => {
                let value = value
                    .map(parse_value::<SchemaValue>)
                    .transpose()?
                    .flatten();
                Ok(LogRecord::Schema {
                    subject,
                    version,
                    value,
                })
            }
            LogKey::DeleteSubject { .. } => {
                let value = value
                    .map(parse_value::<DeleteSubjectValue>)
                    .transpose()?
                    .flatten();
                Ok(LogRecord::DeleteSubject { value })
            }
            LogKey::Noop => Ok(LogRecord::Noop),
        }
    }
}

/// Parse a record value, mapping a JSON `null` to a tombstone
fn parse_value<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<Option<T>> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ReaderError::InvalidValue(e.to_string()))?;
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ReaderError::InvalidValue(e.to_string()))
}
