//! Backup and restore of the schemas topic

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schema_registry_backup::{BackupVersion, PollTimeout, SchemaBackup};
use schema_registry_core::RegistryConfig;

#[derive(Debug, Parser)]
#[command(name = "schema-backup", about = "Create and restore schemas-topic backups")]
struct Cli {
    /// Path to the registry configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a backup of the schemas topic
    Create {
        /// Backup file, or "-" for stdout (format 2 only)
        #[arg(long)]
        location: String,

        /// Backup format: 2, 3, or anonymize
        #[arg(long, default_value = "3")]
        version: BackupVersion,

        /// Back up this topic instead of the configured one
        #[arg(long)]
        topic: Option<String>,

        /// Seconds to wait for records before declaring the consumer stale
        #[arg(long, default_value_t = 60)]
        poll_timeout: u64,

        /// Overwrite an existing backup file
        #[arg(long)]
        overwrite: bool,
    },
    /// Restore a backup into the schemas topic
    Restore {
        /// Backup file to restore from
        #[arg(long)]
        location: String,

        /// Restore into this topic instead of the configured one
        #[arg(long)]
        topic: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = RegistryConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Create {
            location,
            version,
            topic,
            poll_timeout,
            overwrite,
        } => {
            let backup = SchemaBackup::new(config, &location, topic);
            backup.create(version, PollTimeout::from_secs(poll_timeout), overwrite)?;
        }
        Command::Restore { location, topic } => {
            let backup = SchemaBackup::new(config, &location, topic);
            backup.restore()?;
        }
    }
    Ok(())
}
