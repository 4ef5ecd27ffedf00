use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    codec::SnapshotCodec,
    errors::{BackendError, BackupError},
    naming::SnapshotName,
    storage::StorageBackend,
};

const DEFAULT_MAX_NAME_ATTEMPTS: usize = 16;

/// Identifier of a snapshot within one backend's namespace.
pub type SnapshotId = String;

/// Captures the live database and hands the snapshot to a backend. Never mutates the database.
#[derive(Clone)]
pub struct BackupCoordinator {
    codec: SnapshotCodec,
    clock: Arc<dyn Clock>,
    max_name_attempts: usize,
}

impl BackupCoordinator {
    pub fn new(codec: SnapshotCodec) -> Self {
        Self {
            codec,
            clock: Arc::new(SystemClock),
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_name_attempts(mut self, attempts: usize) -> Self {
        self.max_name_attempts = attempts.max(1);
        self
    }

    /// Encodes once, then derives names until the backend accepts one.
    pub async fn save(&self, backend: &dyn StorageBackend) -> Result<SnapshotId, BackupError> {
        let kind = backend.kind();
        let blob = self.codec.encode().await.map_err(|err| {
            tracing::error!(backend = %kind, error = %err, "snapshot encoding failed");
            err
        })?;
        let created_at = self.clock.now();

        for sequence in 1..=self.max_name_attempts {
            let name = SnapshotName::new(created_at, sequence as u32).to_string();
            match backend.write(&name, &blob).await {
                Ok(()) => {
                    tracing::info!(backend = %kind, snapshot = %name, bytes = blob.len(), "backup saved");
                    return Ok(name);
                }
                Err(BackendError::AlreadyExists(_)) => {
                    tracing::debug!(backend = %kind, snapshot = %name, "snapshot name taken, trying next");
                }
                Err(err) => {
                    tracing::error!(backend = %kind, snapshot = %name, error = %err, "backup failed");
                    return Err(err.into());
                }
            }
        }
        Err(BackupError::NameExhausted {
            attempts: self.max_name_attempts,
        })
    }
}
