//! # Schema Registry Core
//!
//! Core types and shared helpers for the Kafka-backed schema registry.
//!
//! This crate provides the foundational pieces used throughout the registry:
//!
//! - The typed schema value model (`TypedSchema`)
//! - Schema kind and compatibility mode enums
//! - Registry configuration
//! - Error types
//! - The fixed-backoff retry helper used around Kafka client creation

pub mod config;
pub mod error;
pub mod retry;
pub mod schema;
pub mod types;

// Re-export commonly used types
pub use config::{RegistryConfig, DEFAULT_SCHEMA_TOPIC};
pub use error::{Error, Result};
pub use schema::{ParsedSchema, TypedSchema};
pub use types::{CompatibilityMode, SchemaId, SchemaKind, Version};
