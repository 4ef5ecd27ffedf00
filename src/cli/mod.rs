//! Command-line front end for the backup subsystem.

pub mod commands;
pub mod output;

use std::io;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::{
    config::ConfigError,
    database::DatabaseError,
    errors::{AuthError, BackendError, BackupError, RestoreError},
    service::ServiceError,
    storage::StorageBackendKind,
};

/// Environment variable holding a pre-issued access token for `connect`.
pub const OAUTH_TOKEN_ENV: &str = "BACKUP_CORE_OAUTH_TOKEN";

#[derive(Debug, Parser)]
#[command(name = "backup_core_cli", version, about = "Back up and restore the Backup Core database")]
pub struct Cli {
    /// Only print results, warnings and errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Disable colours and icons.
    #[arg(long, global = true)]
    pub plain: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Snapshot the live database to a backend.
    Save { backend: StorageBackendKind },
    /// List snapshots on a backend, newest first.
    List { backend: StorageBackendKind },
    /// Replace the live database with a snapshot.
    Restore {
        backend: StorageBackendKind,
        snapshot: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Delete one snapshot.
    Delete {
        backend: StorageBackendKind,
        snapshot: String,
        #[arg(long)]
        yes: bool,
    },
    /// Delete all but the newest snapshots on a backend.
    Prune {
        backend: StorageBackendKind,
        #[arg(long, default_value_t = 5)]
        keep: usize,
        #[arg(long)]
        yes: bool,
    },
    /// Authorize the OAuth cloud backend.
    Connect,
    /// Forget the OAuth cloud credential.
    Disconnect,
    /// Show paths, connection state and restore state.
    Status,
    /// Add a record to the live database.
    Add { title: String },
    /// Print the records in the live database.
    Records,
    /// Show build metadata.
    Version,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("backup failed: {0}")]
    Backup(#[from] BackupError),
    #[error("restore failed: {0}")]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("could not start async runtime: {0}")]
    Runtime(io::Error),
}

impl CliError {
    /// What the user should do next, when there is something actionable.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            CliError::Backup(err) => Some(err.guidance()),
            CliError::Restore(err) => Some(err.guidance()),
            CliError::Backend(err) => Some(err.guidance()),
            CliError::Auth(AuthError::Expired) => Some(BackendError::Auth(AuthError::Expired).guidance()),
            CliError::Auth(AuthError::Cancelled) => Some("Set BACKUP_CORE_OAUTH_TOKEN and run `connect` again."),
            _ => None,
        }
    }
}

/// Parses the process arguments and runs the selected command.
pub fn run_cli() -> Result<(), CliError> {
    run_with(Cli::parse())
}

pub fn run_with(cli: Cli) -> Result<(), CliError> {
    output::set_preferences(output::OutputPreferences {
        plain: cli.plain,
        quiet: cli.quiet,
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(commands::dispatch(cli.command))
}

/// Prints a failed command's error and, when there is one, what to do about it.
pub fn report(err: &CliError) {
    output::error(err);
    if let Some(hint) = err.guidance() {
        output::warning(hint);
    }
}
