use std::io;

use thiserror::Error;

/// Failures raised while capturing or checking a snapshot blob.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("database could not be read: {0}")]
    Unreadable(#[from] io::Error),
    #[error("database stayed locked for more than {waited_ms} ms")]
    Locked { waited_ms: u64 },
    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),
}

/// OAuth session failures. Both variants surface as the `AuthError` class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("not connected to the cloud service")]
    Unauthenticated,
    #[error("cloud service session expired")]
    Expired,
    #[error("authorization was cancelled")]
    Cancelled,
    #[error("authorization failed: {0}")]
    Rejected(String),
}

/// Errors produced by a [`StorageBackend`](crate::storage::StorageBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("snapshot `{0}` not found")]
    NotFound(String),
    #[error("snapshot `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid snapshot name `{0}`")]
    InvalidName(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("network error: {0}")]
    Network(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cloud service replied {status}: {message}")]
    Remote { status: u16, message: String },
}

impl BackendError {
    pub fn guidance(&self) -> &'static str {
        match self {
            BackendError::NotFound(_) => "The selected backup no longer exists. Refresh the list.",
            BackendError::AlreadyExists(_) => "A backup with that name already exists.",
            BackendError::InvalidName(_) => "The backup name is not valid for this storage.",
            BackendError::Auth(AuthError::Expired) => {
                "Your cloud session expired. Connect to the cloud service again."
            }
            BackendError::Auth(_) => "Not connected to the cloud service. Connect first.",
            BackendError::Network(_) => "No internet connection. Check your network and retry.",
            BackendError::Io(_) => "Could not access device storage. Check free space and permissions.",
            BackendError::Remote { .. } => "The cloud service rejected the request. Try again later.",
        }
    }
}

/// Error returned by the application-state reload collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ReloadError(pub String);

/// Errors surfaced by [`BackupCoordinator::save`](crate::backup::BackupCoordinator::save).
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("could not snapshot the database: {0}")]
    Encoding(#[from] CodecError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("no free snapshot name after {attempts} attempts")]
    NameExhausted { attempts: usize },
}

impl BackupError {
    pub fn guidance(&self) -> &'static str {
        match self {
            BackupError::Encoding(CodecError::Locked { .. }) => {
                "The database is busy. Wait a moment and try again."
            }
            BackupError::Encoding(_) => "The database could not be read for backup.",
            BackupError::Backend(err) => err.guidance(),
            BackupError::NameExhausted { .. } => "Too many backups were created at once. Retry.",
        }
    }
}

/// Errors surfaced by [`RestoreCoordinator::restore`](crate::restore::RestoreCoordinator::restore).
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("backup file is corrupted: {0}")]
    CorruptSnapshot(String),
    #[error("could not replace the database file: {0}")]
    Swap(io::Error),
    #[error("another restore is already running")]
    InProgress,
    #[error("database restored but the app could not reload: {0}")]
    ReloadFailed(ReloadError),
}

impl RestoreError {
    pub fn guidance(&self) -> &'static str {
        match self {
            RestoreError::Backend(err) => err.guidance(),
            RestoreError::CorruptSnapshot(_) => "The backup file is corrupted and was not restored.",
            RestoreError::Swap(_) => "The database could not be replaced. Your data is unchanged.",
            RestoreError::InProgress => "A restore is already running. Wait for it to finish.",
            RestoreError::ReloadFailed(_) => "The backup was restored. Restart the app to finish.",
        }
    }
}
