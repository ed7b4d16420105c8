//! # Schema Registry Security
//!
//! File-based users and access control for the registry: password hashing,
//! the JSON auth file model, and an authorizer that refreshes itself while
//! keeping the previous tables when a reload fails.

pub mod auth;

pub use auth::{
    generate_salt, hash_password, AuthError, FileAuthorizer, HashAlgorithm, Operation, User,
};
