pub mod filesystem;
pub mod oauth_cloud;

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

pub use filesystem::FileSystemBackend;
pub use oauth_cloud::OAuthCloudBackend;

pub type Result<T> = std::result::Result<T, BackendError>;

/// The physical media a snapshot can live on. Each kind is its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackendKind {
    Local,
    CloudSyncFolder,
    OAuthCloud,
}

impl StorageBackendKind {
    pub const ALL: [StorageBackendKind; 3] = [
        StorageBackendKind::Local,
        StorageBackendKind::CloudSyncFolder,
        StorageBackendKind::OAuthCloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackendKind::Local => "local",
            StorageBackendKind::CloudSyncFolder => "cloud-sync",
            StorageBackendKind::OAuthCloud => "oauth-cloud",
        }
    }
}

impl fmt::Display for StorageBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackendKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackendKind::Local),
            "cloud-sync" | "cloud" | "icloud" => Ok(StorageBackendKind::CloudSyncFolder),
            "oauth-cloud" | "oauth" | "dropbox" => Ok(StorageBackendKind::OAuthCloud),
            other => Err(format!(
                "unknown backend `{other}` (expected local, cloud-sync or oauth-cloud)"
            )),
        }
    }
}

/// A snapshot as seen by a backend listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub name: String,
    pub size_bytes: u64,
}

/// One physical medium able to store, fetch, enumerate and delete named snapshots.
///
/// `write` is all-or-nothing: a failed write never leaves a listable snapshot, and an
/// existing name is never overwritten ([`BackendError::AlreadyExists`]).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> StorageBackendKind;

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()>;

    async fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Every snapshot visible to this backend, newest first.
    async fn list(&self) -> Result<Vec<SnapshotEntry>>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// One backend instance per kind, handed to the coordinators by the UI layer.
#[derive(Clone)]
pub struct Backends {
    local: Arc<dyn StorageBackend>,
    cloud_sync: Arc<dyn StorageBackend>,
    oauth_cloud: Arc<dyn StorageBackend>,
}

impl Backends {
    pub fn new(
        local: Arc<dyn StorageBackend>,
        cloud_sync: Arc<dyn StorageBackend>,
        oauth_cloud: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            local,
            cloud_sync,
            oauth_cloud,
        }
    }

    pub fn get(&self, kind: StorageBackendKind) -> Arc<dyn StorageBackend> {
        match kind {
            StorageBackendKind::Local => Arc::clone(&self.local),
            StorageBackendKind::CloudSyncFolder => Arc::clone(&self.cloud_sync),
            StorageBackendKind::OAuthCloud => Arc::clone(&self.oauth_cloud),
        }
    }
}
