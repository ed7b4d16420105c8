//! Compatibility verdict model

use serde::{Deserialize, Serialize};

/// Kind of incompatibility detected between two schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncompatibilityKind {
    /// Schemas are of different serialization formats or base types
    TypeMismatch,
    /// Named schemas (record, enum, fixed) have different names
    NameMismatch,
    /// Fixed schemas have different sizes
    FixedSizeMismatch,
    /// Reader enum lacks symbols the writer may produce
    MissingEnumSymbols,
    /// Reader record field absent from the writer and without a default
    ReaderFieldMissingDefaultValue,
    /// No reader union branch can decode the writer schema
    MissingUnionBranch,
    /// JSON Schema type set was narrowed
    TypeNarrowed,
    /// JSON Schema property removed while additional properties are forbidden
    PropertyRemoved,
    /// JSON Schema required property added without a default
    RequiredPropertyAdded,
    /// JSON Schema enum no longer accepts all writer values
    EnumNarrowed,
    /// No comparator is available for this schema format
    ComparatorUnavailable,
}

/// A single incompatibility with its location inside the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incompatibility {
    /// What went wrong
    pub kind: IncompatibilityKind,
    /// Slash-separated path into the schema, e.g. `/fields/3/type`
    pub location: String,
    /// Human-readable description
    pub message: String,
}

/// Outcome of a compatibility check
///
/// Compatible iff no incompatibilities were recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Incompatibilities found, empty when compatible
    pub incompatibilities: Vec<Incompatibility>,
}

impl CompatibilityResult {
    /// A compatible verdict
    pub fn compatible() -> Self {
        Self::default()
    }

    /// A verdict with a single incompatibility
    pub fn incompatible(
        kind: IncompatibilityKind,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            incompatibilities: vec![Incompatibility {
                kind,
                location: location.into(),
                message: message.into(),
            }],
        }
    }

    /// Whether the checked schemas are compatible
    pub fn is_compatible(&self) -> bool {
        self.incompatibilities.is_empty()
    }

    /// Record an incompatibility
    pub fn push(
        &mut self,
        kind: IncompatibilityKind,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.incompatibilities.push(Incompatibility {
            kind,
            location: location.into(),
            message: message.into(),
        });
    }

    /// Merge two verdicts: compatible iff both are, otherwise the
    /// concatenation of their incompatibilities
    pub fn merge(mut self, other: CompatibilityResult) -> CompatibilityResult {
        self.incompatibilities.extend(other.incompatibilities);
        self
    }
}
