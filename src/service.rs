//! Wires the backup subsystem together from a [`Config`] and an application home.

use std::{path::Path, sync::Arc};

use thiserror::Error;

use crate::{
    backup::{BackupCoordinator, SnapshotId},
    catalog::{BackupCatalog, SnapshotInfo},
    codec::SnapshotCodec,
    config::{Config, ConfigError},
    database::{DatabaseError, RecordStore},
    errors::{AuthError, BackendError, BackupError, RestoreError},
    oauth::{Authorizer, AuthorizationState, OAuthSession},
    restore::{ReloadHook, RestoreCoordinator},
    storage::{Backends, FileSystemBackend, OAuthCloudBackend, StorageBackend, StorageBackendKind},
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not open the database: {0}")]
    Database(#[from] DatabaseError),
}

/// Everything the UI layer needs to drive backups, restores and the cloud session.
pub struct BackupService {
    store: Arc<RecordStore>,
    backends: Backends,
    session: Arc<OAuthSession>,
    backup: BackupCoordinator,
    restore: RestoreCoordinator,
    catalog: BackupCatalog,
}

impl BackupService {
    pub fn open(
        config: &Config,
        home: &Path,
        authorizer: Arc<dyn Authorizer>,
    ) -> Result<Self, ServiceError> {
        let store = Arc::new(RecordStore::open(config.resolve_database_path(home))?);

        let session = Arc::new(
            OAuthSession::with_token_file(authorizer, config.resolve_token_file(home))
                .map_err(ConfigError::from)?,
        );
        let local = FileSystemBackend::local(config.resolve_local_backup_dir(home))
            .map_err(ConfigError::from)?;
        let cloud_sync = FileSystemBackend::cloud_sync_folder(config.resolve_cloud_sync_dir())
            .map_err(ConfigError::from)?;
        let oauth_cloud = OAuthCloudBackend::new(Arc::clone(&session), &config.oauth)?;
        let backends = Backends::new(Arc::new(local), Arc::new(cloud_sync), Arc::new(oauth_cloud));

        Ok(Self::assemble(store, backends, session, config))
    }

    /// Builds the service around already-constructed parts.
    pub fn from_parts(
        store: Arc<RecordStore>,
        backends: Backends,
        session: Arc<OAuthSession>,
        config: &Config,
    ) -> Self {
        Self::assemble(store, backends, session, config)
    }

    fn assemble(
        store: Arc<RecordStore>,
        backends: Backends,
        session: Arc<OAuthSession>,
        config: &Config,
    ) -> Self {
        let codec = SnapshotCodec::new(store.clone(), config.snapshot_lock_wait());
        let backup = BackupCoordinator::new(codec).with_max_name_attempts(config.max_name_attempts);
        let reload: Arc<dyn ReloadHook> = store.clone();
        let restore = RestoreCoordinator::new(store.clone(), reload);
        Self {
            store,
            backends,
            session,
            backup,
            restore,
            catalog: BackupCatalog::new(),
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn backend(&self, kind: StorageBackendKind) -> Arc<dyn StorageBackend> {
        self.backends.get(kind)
    }

    pub fn restore_coordinator(&self) -> &RestoreCoordinator {
        &self.restore
    }

    pub async fn save(&self, kind: StorageBackendKind) -> Result<SnapshotId, BackupError> {
        self.backup.save(self.backends.get(kind).as_ref()).await
    }

    pub async fn restore(&self, kind: StorageBackendKind, id: &str) -> Result<(), RestoreError> {
        self.restore.restore(self.backends.get(kind).as_ref(), id).await
    }

    pub async fn list(&self, kind: StorageBackendKind) -> Result<Vec<SnapshotInfo>, BackendError> {
        self.catalog.list(self.backends.get(kind).as_ref()).await
    }

    pub async fn delete(&self, kind: StorageBackendKind, id: &str) -> Result<(), BackendError> {
        self.backends.get(kind).delete(id).await
    }

    pub async fn prune(
        &self,
        kind: StorageBackendKind,
        keep: usize,
    ) -> Result<Vec<String>, BackendError> {
        self.catalog.prune(self.backends.get(kind).as_ref(), keep).await
    }

    pub async fn authorize(&self) -> Result<(), AuthError> {
        self.session.authorize().await
    }

    pub fn sign_out(&self) {
        self.session.sign_out();
    }

    pub fn current_state(&self) -> AuthorizationState {
        self.session.current_state()
    }
}
