use std::{
    fs, io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Result, SnapshotEntry, StorageBackend, StorageBackendKind};
use crate::{
    errors::BackendError,
    naming::{self, SNAPSHOT_EXTENSION},
    utils::persistence::StagedFile,
};

/// Directory-backed snapshot storage.
///
/// Serves both the app-private local folder and the platform-mirrored cloud folder;
/// propagation of the latter is the platform's business, so both behave identically here.
#[derive(Debug)]
pub struct FileSystemBackend {
    kind: StorageBackendKind,
    root: PathBuf,
    publish: Mutex<()>,
}

impl FileSystemBackend {
    pub fn local(root: PathBuf) -> io::Result<Self> {
        Self::open(StorageBackendKind::Local, root)
    }

    pub fn cloud_sync_folder(root: PathBuf) -> io::Result<Self> {
        Self::open(StorageBackendKind::CloudSyncFolder, root)
    }

    fn open(kind: StorageBackendKind, root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self {
            kind,
            root,
            publish: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, name: &str) -> Result<PathBuf> {
        if !naming::is_safe_name(name) {
            return Err(BackendError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    fn kind(&self) -> StorageBackendKind {
        self.kind
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.snapshot_path(name)?;
        let data = bytes.to_vec();
        let _publishing = self.publish.lock().await;
        let outcome = tokio::task::spawn_blocking(move || {
            StagedFile::stage(&path, &data).and_then(StagedFile::commit_new)
        })
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        match outcome {
            Ok(()) => {
                tracing::info!(backend = %self.kind, snapshot = name, bytes = bytes.len(), "snapshot written");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(BackendError::AlreadyExists(name.to_string()))
            }
            Err(err) => {
                tracing::error!(backend = %self.kind, snapshot = name, error = %err, "snapshot write failed");
                Err(err.into())
            }
        }
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.snapshot_path(name)?;
        tokio::fs::read(&path).await.map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound(name.to_string()),
            _ => err.into(),
        })
    }

    async fn list(&self) -> Result<Vec<SnapshotEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let name = match path.file_name().and_then(|name| name.to_str()) {
                Some(name) if !name.starts_with('.') => name.to_string(),
                _ => continue,
            };
            if let Some(listed) = listed_entry(name, entry.metadata().await)? {
                entries.push(listed);
            }
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.snapshot_path(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => BackendError::NotFound(name.to_string()),
                _ => err.into(),
            })?;
        tracing::info!(backend = %self.kind, snapshot = name, "snapshot deleted");
        Ok(())
    }
}

/// Turns one directory entry into a listing row; entries deleted mid-listing are skipped.
fn listed_entry(
    name: String,
    metadata: io::Result<fs::Metadata>,
) -> io::Result<Option<SnapshotEntry>> {
    match metadata {
        Ok(metadata) if metadata.is_file() => Ok(Some(SnapshotEntry {
            name,
            size_bytes: metadata.len(),
        })),
        Ok(_) => Ok(None),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(snapshot = %name, "snapshot vanished while listing");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Orders listing entries newest-first by the timestamp embedded in their names.
pub(crate) fn sort_entries(entries: &mut [SnapshotEntry]) {
    entries.sort_by(|a, b| naming::compare_names(&a.name, &b.name));
}
