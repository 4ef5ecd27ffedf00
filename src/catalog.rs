use chrono::{DateTime, Utc};

use crate::{
    errors::BackendError,
    naming::SnapshotName,
    storage::{StorageBackend, StorageBackendKind},
};

/// Listing row shown to the user before a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub identifier: String,
    pub backend: StorageBackendKind,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Turns raw backend listings into ordered snapshot metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackupCatalog;

impl BackupCatalog {
    pub fn new() -> Self {
        Self
    }

    /// Snapshots on `backend`, newest first. Names that do not parse are skipped.
    pub async fn list(&self, backend: &dyn StorageBackend) -> Result<Vec<SnapshotInfo>, BackendError> {
        let kind = backend.kind();
        let entries = backend.list().await?;
        let mut rows: Vec<(SnapshotName, SnapshotInfo)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(parsed) = SnapshotName::parse(&entry.name) else {
                tracing::warn!(backend = %kind, name = %entry.name, "skipping unrecognised snapshot name");
                continue;
            };
            rows.push((
                parsed,
                SnapshotInfo {
                    identifier: entry.name,
                    backend: kind,
                    size_bytes: entry.size_bytes,
                    created_at: parsed.created_at,
                },
            ));
        }
        rows.sort_by(|(a, _), (b, _)| SnapshotName::newest_first(a, b));
        tracing::debug!(backend = %kind, count = rows.len(), "snapshot catalog listed");
        Ok(rows.into_iter().map(|(_, info)| info).collect())
    }

    /// Deletes every snapshot older than the newest `keep`. Only runs on explicit request.
    pub async fn prune(
        &self,
        backend: &dyn StorageBackend,
        keep: usize,
    ) -> Result<Vec<String>, BackendError> {
        let snapshots = self.list(backend).await?;
        let mut removed = Vec::new();
        for info in snapshots.into_iter().skip(keep) {
            match backend.delete(&info.identifier).await {
                Ok(()) | Err(BackendError::NotFound(_)) => removed.push(info.identifier),
                Err(err) => return Err(err),
            }
        }
        if !removed.is_empty() {
            tracing::info!(backend = %backend.kind(), removed = removed.len(), keep, "pruned snapshots");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemBackend;
    use tempfile::TempDir;

    async fn seeded() -> (FileSystemBackend, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        let backend = FileSystemBackend::local(temp.path().to_path_buf()).expect("backend");
        for name in [
            "snapshot_20261018_080000.bks",
            "snapshot_20261019_080000.bks",
            "snapshot_20261019_080000_2.bks",
            "snapshot_garbage.bks",
        ] {
            backend.write(name, b"blob").await.expect("seed snapshot");
        }
        (backend, temp)
    }

    #[tokio::test]
    async fn list_skips_malformed_names_and_orders_newest_first() {
        let (backend, _guard) = seeded().await;
        let rows = BackupCatalog::new().list(&backend).await.expect("list");
        let ids: Vec<_> = rows.iter().map(|row| row.identifier.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "snapshot_20261019_080000_2.bks",
                "snapshot_20261019_080000.bks",
                "snapshot_20261018_080000.bks",
            ]
        );
        assert!(rows.iter().all(|row| row.size_bytes == 4));
        assert!(rows.iter().all(|row| row.backend == StorageBackendKind::Local));
    }

    #[tokio::test]
    async fn listing_is_stable_without_writes() {
        let (backend, _guard) = seeded().await;
        let catalog = BackupCatalog::new();
        let first = catalog.list(&backend).await.expect("first list");
        let second = catalog.list(&backend).await.expect("second list");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn prune_keeps_newest() {
        let (backend, _guard) = seeded().await;
        let catalog = BackupCatalog::new();
        let removed = catalog.prune(&backend, 1).await.expect("prune");
        assert_eq!(
            removed,
            vec![
                "snapshot_20261019_080000.bks".to_string(),
                "snapshot_20261018_080000.bks".to_string(),
            ]
        );
        let left = catalog.list(&backend).await.expect("list");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].identifier, "snapshot_20261019_080000_2.bks");
    }
}
