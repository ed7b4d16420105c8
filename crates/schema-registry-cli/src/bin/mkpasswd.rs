//! Password hasher for the registry auth file
//!
//! Emits a JSON object suitable for the `users` list of the auth file.

use anyhow::Result;
use clap::Parser;
use serde_json::json;

use schema_registry_security::{generate_salt, hash_password, HashAlgorithm};

#[derive(Debug, Parser)]
#[command(name = "mkpasswd", about = "Schema registry password hasher")]
struct Args {
    /// Username
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Hash algorithm
    #[arg(short = 'a', long, default_value = "sha512")]
    algorithm: HashAlgorithm,

    /// Password to hash
    password: String,

    /// Salt for hashing, randomly generated if not given
    salt: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let salt = args.salt.unwrap_or_else(generate_salt);

    let mut result = serde_json::Map::new();
    if let Some(user) = args.user {
        result.insert("username".to_string(), json!(user));
    }
    result.insert("algorithm".to_string(), json!(args.algorithm.to_string()));
    result.insert("salt".to_string(), json!(salt));
    result.insert(
        "password_hash".to_string(),
        json!(hash_password(args.algorithm, &salt, &args.password)?),
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
