//! Boundary to the embedded database.
//!
//! The backup subsystem treats the database as an opaque file plus a "do not write
//! while I snapshot" contract. [`RecordStore`] is the JSON-file store the application
//! keeps its records in; it honours that contract with a read/write gate.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    errors::{CodecError, ReloadError},
    restore::ReloadHook,
    utils::persistence::write_atomic,
};

const FORMAT_MARKER: &str = "backup-core-records";
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// What the backup subsystem needs from the embedded database layer.
#[async_trait]
pub trait Database: Send + Sync {
    /// Path of the live database file that restores replace.
    fn live_path(&self) -> &Path;

    /// Returns the complete on-disk bytes, holding writers off while reading.
    ///
    /// Fails with [`CodecError::Locked`] when the store cannot be frozen within `wait`.
    async fn open_for_snapshot_read(&self, wait: Duration) -> Result<Vec<u8>, CodecError>;

    /// Parks every writer until the returned guard drops.
    ///
    /// Held from the swap until the reload finished, so no write based on the
    /// replaced file can land on top of the restored one.
    async fn freeze_writers(&self) -> WriterFreeze;
}

/// Opaque guard returned by [`Database::freeze_writers`].
pub struct WriterFreeze {
    _guard: Box<dyn Send + Sync>,
}

impl WriterFreeze {
    pub fn new(guard: impl Send + Sync + 'static) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Unsupported database file: {0}")]
    Format(String),
}

/// A single task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DatabaseFile {
    format: String,
    schema_version: u32,
    #[serde(default)]
    records: Vec<Record>,
}

/// File-backed record database. Every mutation rewrites the file through an atomic rename.
///
/// Writers pass `write_gate` shared before touching `records`; a restore holds it
/// exclusively while the file underneath is replaced.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: RwLock<Vec<Record>>,
    write_gate: Arc<RwLock<()>>,
}

impl RecordStore {
    /// Opens the database at `path`, creating an empty one when the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let path = path.into();
        let records = if path.exists() {
            load_records(&path)?
        } else {
            persist(&path, &[])?;
            Vec::new()
        };
        Ok(Self {
            path,
            records: RwLock::new(records),
            write_gate: Arc::new(RwLock::new(())),
        })
    }

    pub async fn add(&self, title: impl Into<String>) -> Result<Record, DatabaseError> {
        let record = Record {
            id: Uuid::new_v4(),
            title: title.into(),
            done: false,
            created_at: Utc::now(),
        };
        let _writing = self.write_gate.read().await;
        let mut records = self.records.write().await;
        let mut next = records.clone();
        next.push(record.clone());
        persist(&self.path, &next)?;
        *records = next;
        Ok(record)
    }

    /// Records as of the last load or reload.
    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    /// Re-reads the file, discarding the in-memory view.
    pub async fn reload(&self) -> Result<usize, DatabaseError> {
        let mut records = self.records.write().await;
        *records = load_records(&self.path)?;
        tracing::info!(path = %self.path.display(), count = records.len(), "record store reloaded");
        Ok(records.len())
    }
}

#[async_trait]
impl Database for RecordStore {
    fn live_path(&self) -> &Path {
        &self.path
    }

    async fn open_for_snapshot_read(&self, wait: Duration) -> Result<Vec<u8>, CodecError> {
        let _frozen = tokio::time::timeout(wait, self.records.read())
            .await
            .map_err(|_| CodecError::Locked {
                waited_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            })?;
        Ok(tokio::fs::read(&self.path).await?)
    }

    async fn freeze_writers(&self) -> WriterFreeze {
        WriterFreeze::new(Arc::clone(&self.write_gate).write_owned().await)
    }
}

#[async_trait]
impl ReloadHook for RecordStore {
    async fn on_database_replaced(&self) -> Result<(), ReloadError> {
        self.reload()
            .await
            .map(|_| ())
            .map_err(|err| ReloadError(err.to_string()))
    }
}

fn load_records(path: &Path) -> Result<Vec<Record>, DatabaseError> {
    let data = std::fs::read_to_string(path)?;
    let file: DatabaseFile = serde_json::from_str(&data)?;
    if file.format != FORMAT_MARKER {
        return Err(DatabaseError::Format(format!(
            "`{}` is not a record database",
            path.display()
        )));
    }
    if file.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(DatabaseError::Format(format!(
            "`{}` is from a newer schema version",
            path.display()
        )));
    }
    Ok(file.records)
}

fn persist(path: &Path, records: &[Record]) -> Result<(), DatabaseError> {
    let file = DatabaseFile {
        format: FORMAT_MARKER.into(),
        schema_version: CURRENT_SCHEMA_VERSION,
        records: records.to_vec(),
    };
    let json = serde_json::to_vec_pretty(&file)?;
    write_atomic(path, &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_empty_database() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("data").join("records.db");
        let store = RecordStore::open(&path).expect("open store");
        assert!(path.exists());
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("records.db");
        let store = RecordStore::open(&path).expect("open store");
        store.add("Buy milk").await.expect("add record");

        let reopened = RecordStore::open(&path).expect("reopen store");
        let titles: Vec<_> = reopened.records().await.into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["Buy milk".to_string()]);
    }

    #[tokio::test]
    async fn snapshot_read_times_out_while_writer_holds_gate() {
        let temp = TempDir::new().expect("temp dir");
        let store = RecordStore::open(temp.path().join("records.db")).expect("open store");
        let _writer = store.records.write().await;

        let err = store
            .open_for_snapshot_read(Duration::from_millis(20))
            .await
            .expect_err("should time out");
        assert!(matches!(err, CodecError::Locked { waited_ms: 20 }));
    }

    #[tokio::test]
    async fn frozen_writers_wait_for_release() {
        let temp = TempDir::new().expect("temp dir");
        let store =
            Arc::new(RecordStore::open(temp.path().join("records.db")).expect("open store"));
        let freeze = store.freeze_writers().await;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.add("Buy bread").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());
        assert_eq!(store.reload().await.expect("reload while frozen"), 0);

        drop(freeze);
        writer.await.expect("writer task").expect("add record");
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn rejects_foreign_files() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("records.db");
        std::fs::write(&path, r#"{"format":"other","schema_version":1}"#).expect("write file");
        assert!(matches!(
            RecordStore::open(&path),
            Err(DatabaseError::Format(_))
        ));
    }
}
