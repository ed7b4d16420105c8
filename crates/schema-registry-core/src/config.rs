//! Registry configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::CompatibilityMode;

/// Name of the schemas topic when none is configured
pub const DEFAULT_SCHEMA_TOPIC: &str = "_schemas";

/// Configuration consulted by the reader loop and the backup engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Name of the compacted schemas topic
    #[serde(default = "default_topic_name")]
    pub topic_name: String,

    /// Replication factor used when creating the schemas topic
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,

    /// Kafka bootstrap servers
    #[serde(default = "default_bootstrap_uri")]
    pub bootstrap_uri: String,

    /// Client id passed to every Kafka client
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Consumer session timeout (milliseconds)
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,

    /// Metadata refresh interval (milliseconds)
    #[serde(default = "default_metadata_max_age_ms")]
    pub metadata_max_age_ms: u32,

    /// Canonicalize record keys when restoring backups of non-default topics
    #[serde(default)]
    pub force_key_correction: bool,

    /// Initial global compatibility mode
    #[serde(default = "default_compatibility")]
    pub compatibility: CompatibilityMode,
}

fn default_topic_name() -> String {
    DEFAULT_SCHEMA_TOPIC.to_string()
}

fn default_replication_factor() -> i32 {
    1
}

fn default_bootstrap_uri() -> String {
    "127.0.0.1:9092".to_string()
}

fn default_client_id() -> String {
    "schema-registry".to_string()
}

fn default_session_timeout_ms() -> u32 {
    10_000
}

fn default_metadata_max_age_ms() -> u32 {
    60_000
}

fn default_compatibility() -> CompatibilityMode {
    CompatibilityMode::Backward
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            topic_name: default_topic_name(),
            replication_factor: default_replication_factor(),
            bootstrap_uri: default_bootstrap_uri(),
            client_id: default_client_id(),
            session_timeout_ms: default_session_timeout_ms(),
            metadata_max_age_ms: default_metadata_max_age_ms(),
            force_key_correction: false,
            compatibility: default_compatibility(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from an optional file, with `SCHEMA_REGISTRY_*`
    /// environment variables taking precedence
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(config::Environment::with_prefix("SCHEMA_REGISTRY"))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }
}
