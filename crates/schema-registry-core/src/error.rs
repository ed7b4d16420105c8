//! Error types shared across the registry crates

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for core registry operations
#[derive(Error, Debug)]
pub enum Error {
    /// Schema text could not be parsed for its declared kind
    #[error("schema parse error: {0}")]
    SchemaParse(String),

    /// Schema type string on the wire is not one of AVRO, JSON, PROTOBUF
    #[error("unknown schema type: {0}")]
    UnknownSchemaType(String),

    /// Compatibility mode string is not a supported mode
    #[error("unknown compatibility mode: {0}")]
    UnknownCompatibilityMode(String),

    /// Configuration could not be loaded or is not valid
    #[error("configuration is not valid: {0}")]
    InvalidConfiguration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if the error is a schema parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::SchemaParse(_))
    }
}
