//! Core type definitions

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Serialization format of a registered schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaKind {
    /// Apache Avro
    #[serde(rename = "AVRO")]
    Avro,
    /// JSON Schema (draft 7)
    #[serde(rename = "JSON")]
    JsonSchema,
    /// Protocol Buffers
    #[serde(rename = "PROTOBUF")]
    Protobuf,
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaKind::Avro => write!(f, "AVRO"),
            SchemaKind::JsonSchema => write!(f, "JSON"),
            SchemaKind::Protobuf => write!(f, "PROTOBUF"),
        }
    }
}

impl FromStr for SchemaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVRO" => Ok(SchemaKind::Avro),
            "JSON" => Ok(SchemaKind::JsonSchema),
            "PROTOBUF" => Ok(SchemaKind::Protobuf),
            other => Err(Error::UnknownSchemaType(other.to_string())),
        }
    }
}

/// Compatibility mode for schema evolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityMode {
    /// New schema can read old data
    Backward,
    /// Old schema can read new data
    Forward,
    /// Both backward and forward compatible
    Full,
    /// No compatibility required
    None,
    /// Backward compatible with all previous versions
    BackwardTransitive,
    /// Forward compatible with all previous versions
    ForwardTransitive,
    /// Full compatible with all previous versions
    FullTransitive,
}

impl std::fmt::Display for CompatibilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompatibilityMode::Backward => write!(f, "BACKWARD"),
            CompatibilityMode::Forward => write!(f, "FORWARD"),
            CompatibilityMode::Full => write!(f, "FULL"),
            CompatibilityMode::None => write!(f, "NONE"),
            CompatibilityMode::BackwardTransitive => write!(f, "BACKWARD_TRANSITIVE"),
            CompatibilityMode::ForwardTransitive => write!(f, "FORWARD_TRANSITIVE"),
            CompatibilityMode::FullTransitive => write!(f, "FULL_TRANSITIVE"),
        }
    }
}

impl FromStr for CompatibilityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BACKWARD" => Ok(CompatibilityMode::Backward),
            "FORWARD" => Ok(CompatibilityMode::Forward),
            "FULL" => Ok(CompatibilityMode::Full),
            "NONE" => Ok(CompatibilityMode::None),
            "BACKWARD_TRANSITIVE" => Ok(CompatibilityMode::BackwardTransitive),
            "FORWARD_TRANSITIVE" => Ok(CompatibilityMode::ForwardTransitive),
            "FULL_TRANSITIVE" => Ok(CompatibilityMode::FullTransitive),
            other => Err(Error::UnknownCompatibilityMode(other.to_string())),
        }
    }
}

impl CompatibilityMode {
    /// Check if this is a transitive mode
    ///
    /// Transitive modes are identical at the pairwise level; the caller is
    /// responsible for iterating over all prior versions when this returns
    /// true.
    pub fn is_transitive(&self) -> bool {
        matches!(
            self,
            CompatibilityMode::BackwardTransitive
                | CompatibilityMode::ForwardTransitive
                | CompatibilityMode::FullTransitive
        )
    }
}

/// Globally unique, writer-assigned schema identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SchemaId(pub u32);

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SchemaId {
    /// The next identifier in the global sequence
    pub fn next(self) -> SchemaId {
        SchemaId(self.0 + 1)
    }
}

/// Version number of a schema within a subject, unique per subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u32);

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
