//! Users, password hashing, and ACL authorization
//!
//! The auth file is JSON:
//!
//! ```json
//! {
//!   "users": [{"username": "u", "algorithm": "sha512", "salt": "...", "password_hash": "..."}],
//!   "permissions": [{"username": "u", "operation": "Write", "resource": "Subject:.*"}]
//! }
//! ```
//!
//! Read requests are satisfied by either a Read or a Write grant; Write
//! requests only by a Write grant. Resources are matched by a regex anchored
//! at the start of the resource name.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use argon2::Argon2;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use parking_lot::RwLock;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use tracing::{error, info};

/// Iteration count for the salted-digest algorithms
const DIGEST_ROUNDS: u32 = 5000;
/// Output length of the argon2 algorithm
const ARGON2_OUTPUT_LEN: usize = 32;
/// Sleep quantum of the refresh task; cancellation latency is bounded by it
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Result type alias using our AuthError type
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised by the security layer
#[derive(Error, Debug)]
pub enum AuthError {
    /// The auth file is missing, unreadable, or malformed
    #[error("auth configuration is not valid: {0}")]
    InvalidConfiguration(String),

    /// Password hashing failed, e.g. a too-short salt for argon2
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Supported password hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Argon2,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Sha512 => write!(f, "sha512"),
            HashAlgorithm::Argon2 => write!(f, "argon2"),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "argon2" => Ok(HashAlgorithm::Argon2),
            other => Err(AuthError::InvalidConfiguration(format!(
                "unknown hash algorithm {other:?}"
            ))),
        }
    }
}

/// Hash a plaintext password with the given algorithm and salt
pub fn hash_password(
    algorithm: HashAlgorithm,
    salt: &str,
    plaintext_password: &str,
) -> Result<String> {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut digest = Sha256::digest([salt.as_bytes(), plaintext_password.as_bytes()].concat());
            for _ in 1..DIGEST_ROUNDS {
                digest = Sha256::digest(digest);
            }
            Ok(STANDARD.encode(digest))
        }
        HashAlgorithm::Sha512 => {
            let mut digest = Sha512::digest([salt.as_bytes(), plaintext_password.as_bytes()].concat());
            for _ in 1..DIGEST_ROUNDS {
                digest = Sha512::digest(digest);
            }
            Ok(STANDARD.encode(digest))
        }
        HashAlgorithm::Argon2 => {
            let mut output = [0u8; ARGON2_OUTPUT_LEN];
            Argon2::default()
                .hash_password_into(
                    plaintext_password.as_bytes(),
                    salt.as_bytes(),
                    &mut output,
                )
                .map_err(|e| AuthError::Hashing(e.to_string()))?;
            Ok(STANDARD.encode(output))
        }
    }
}

/// Random URL-safe salt for new users
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Comparing digests keeps the comparison time independent of where the
/// strings first differ
fn digests_match(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub algorithm: HashAlgorithm,
    pub salt: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl User {
    /// Verify a plaintext password against the stored hash
    pub fn compare_password(&self, plaintext_password: &str) -> bool {
        match hash_password(self.algorithm, &self.salt, plaintext_password) {
            Ok(candidate) => digests_match(&self.password_hash, &candidate),
            Err(_) => false,
        }
    }
}

/// Operation a permission grants or a request performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Read,
    Write,
}

#[derive(Debug, Clone)]
struct AclEntry {
    username: String,
    operation: Operation,
    resource: Regex,
}

#[derive(Debug, Deserialize)]
struct AuthFileData {
    users: Vec<User>,
    permissions: Vec<PermissionEntry>,
}

#[derive(Debug, Deserialize)]
struct PermissionEntry {
    username: String,
    operation: Operation,
    resource: String,
}

#[derive(Debug, Default)]
struct AuthTables {
    users: HashMap<String, User>,
    permissions: Vec<AclEntry>,
}

/// Authorizer backed by a JSON file
///
/// The first load fails hard on an invalid file; later reloads keep the
/// previous in-memory tables when the file is broken.
pub struct FileAuthorizer {
    path: PathBuf,
    tables: RwLock<AuthTables>,
}

impl FileAuthorizer {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = Self::load(&path)?;
        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    fn load(path: &Path) -> Result<AuthTables> {
        let text = fs::read_to_string(path)
            .map_err(|e| AuthError::InvalidConfiguration(e.to_string()))?;
        let data: AuthFileData = serde_json::from_str(&text)
            .map_err(|e| AuthError::InvalidConfiguration(e.to_string()))?;

        let users: HashMap<String, User> = data
            .users
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();
        let permissions = data
            .permissions
            .into_iter()
            .map(|entry| {
                Ok(AclEntry {
                    username: entry.username,
                    operation: entry.operation,
                    // Rules match from the start of the resource name, not
                    // anywhere inside it.
                    resource: Regex::new(&format!("^(?:{})", entry.resource))
                        .map_err(|e| AuthError::InvalidConfiguration(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            users = users.len(),
            rules = permissions.len(),
            "loaded schema registry access control rules",
        );
        Ok(AuthTables { users, permissions })
    }

    /// Re-read the auth file, swapping tables only on success
    pub fn reload(&self) -> Result<()> {
        let tables = Self::load(&self.path)?;
        *self.tables.write() = tables;
        Ok(())
    }

    /// Look up a user and verify the password
    pub fn authenticate(&self, username: &str, password: &str) -> Option<User> {
        let tables = self.tables.read();
        let user = tables.users.get(username)?;
        user.compare_password(password).then(|| user.clone())
    }

    /// Decide whether `user` may perform `operation` on `resource`
    pub fn check_authorization(
        &self,
        user: Option<&User>,
        operation: Operation,
        resource: &str,
    ) -> bool {
        let Some(user) = user else {
            return false;
        };
        let tables = self.tables.read();
        tables.permissions.iter().any(|entry| {
            entry.username == user.username
                && operation_allowed(operation, entry.operation)
                && entry.resource.is_match(resource)
        })
    }

    /// Reload the auth file whenever its mtime advances
    ///
    /// Cancellation (`JoinHandle::abort`) takes effect within the sleep
    /// quantum. A failed reload keeps the previous tables.
    pub fn spawn_refresh_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_loaded = modified_time(&self.path);
            loop {
                tokio::time::sleep(REFRESH_INTERVAL).await;
                let Some(modified) = modified_time(&self.path) else {
                    error!(path = %self.path.display(), "auth file could not be inspected");
                    continue;
                };
                if last_loaded.is_some_and(|loaded| loaded >= modified) {
                    continue;
                }
                match self.reload() {
                    Ok(()) => last_loaded = Some(modified),
                    Err(e) => {
                        error!(error = %e, "auth file could not be loaded, keeping previous rules");
                    }
                }
            }
        })
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
}

/// Read requests are satisfied by any grant; Write requests need Write
fn operation_allowed(requested: Operation, granted: Operation) -> bool {
    matches!(requested, Operation::Read) || matches!(granted, Operation::Write)
}
