//! Typed schema value model
//!
//! A [`TypedSchema`] couples the canonical source text of a schema with its
//! parsed representation. Parsing is delegated to the ecosystem: `apache-avro`
//! for Avro, `serde_json` plus a draft-7 `jsonschema` compile check for JSON
//! Schema. Protobuf definitions are carried as text; their comparator lives
//! outside this system.

use apache_avro::Schema as AvroSchema;
use jsonschema::{Draft, JSONSchema};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::SchemaKind;

/// Parsed representation of a schema, opaque to most of the registry
#[derive(Debug, Clone)]
pub enum ParsedSchema {
    /// Parsed Avro schema
    Avro(Box<AvroSchema>),
    /// JSON Schema document
    Json(serde_json::Value),
    /// Protobuf definitions are not parsed here
    Protobuf,
}

impl ParsedSchema {
    /// The parsed Avro schema, if this is an Avro value
    pub fn as_avro(&self) -> Option<&AvroSchema> {
        match self {
            ParsedSchema::Avro(schema) => Some(schema),
            _ => None,
        }
    }

    /// The JSON Schema document, if this is a JSON Schema value
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ParsedSchema::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Immutable schema value: kind, source text, and parsed representation
///
/// TypedSchemas are shared across subject versions and the global id table,
/// which is why the type exposes no mutation.
#[derive(Debug, Clone)]
pub struct TypedSchema {
    kind: SchemaKind,
    source: String,
    parsed: ParsedSchema,
}

impl TypedSchema {
    /// Parse schema text for the given kind
    ///
    /// Avro and JSON Schema text must parse with their respective parsers;
    /// Protobuf text is stored as given.
    pub fn parse(kind: SchemaKind, source: &str) -> Result<Self> {
        let parsed = match kind {
            SchemaKind::Avro => {
                let schema = AvroSchema::parse_str(source)
                    .map_err(|e| Error::SchemaParse(format!("invalid Avro schema: {e}")))?;
                ParsedSchema::Avro(Box::new(schema))
            }
            SchemaKind::JsonSchema => {
                let value: serde_json::Value = serde_json::from_str(source)
                    .map_err(|e| Error::SchemaParse(format!("invalid JSON: {e}")))?;
                JSONSchema::options()
                    .with_draft(Draft::Draft7)
                    .compile(&value)
                    .map_err(|e| Error::SchemaParse(format!("invalid JSON Schema: {e}")))?;
                ParsedSchema::Json(value)
            }
            SchemaKind::Protobuf => ParsedSchema::Protobuf,
        };
        Ok(Self {
            kind,
            source: source.to_string(),
            parsed,
        })
    }

    /// Serialization format of this schema
    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// The schema source text as registered
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed representation
    pub fn parsed(&self) -> &ParsedSchema {
        &self.parsed
    }

    /// Canonical text form used for equality and fingerprinting
    ///
    /// Avro uses the parsing canonical form, JSON Schema the compact
    /// serialization of the parsed document, Protobuf the raw text.
    pub fn canonical_form(&self) -> String {
        match &self.parsed {
            ParsedSchema::Avro(schema) => schema.canonical_form(),
            ParsedSchema::Json(value) => value.to_string(),
            ParsedSchema::Protobuf => self.source.clone(),
        }
    }

    /// SHA-256 fingerprint of kind and canonical form
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.canonical_form().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PartialEq for TypedSchema {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match (&self.parsed, &other.parsed) {
            (ParsedSchema::Avro(a), ParsedSchema::Avro(b)) => {
                a.canonical_form() == b.canonical_form()
            }
            (ParsedSchema::Json(a), ParsedSchema::Json(b)) => a == b,
            (ParsedSchema::Protobuf, ParsedSchema::Protobuf) => self.source == other.source,
            _ => false,
        }
    }
}

impl Eq for TypedSchema {}
