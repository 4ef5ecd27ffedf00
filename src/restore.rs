//! Replaces the live database with a stored snapshot.
//!
//! `Idle -> Fetching -> Validating -> Swapping -> Reloading -> Done`
//!
//! Failures before `Swapping` leave the live file untouched. The swap itself is a
//! staged write beside the live file followed by one rename, so readers in other
//! processes only ever see the old file or the new one.

use std::{
    collections::HashSet,
    fmt, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::{
    codec::SnapshotCodec,
    database::Database,
    errors::{ReloadError, RestoreError},
    storage::StorageBackend,
    utils::persistence::StagedFile,
};

/// Live database files with a restore running against them, process wide.
static RESTORING: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Application collaborator that rebuilds in-memory state after the database file changed.
#[async_trait]
pub trait ReloadHook: Send + Sync {
    async fn on_database_replaced(&self) -> Result<(), ReloadError>;
}

/// Adapts a plain closure into a [`ReloadHook`].
pub struct ReloadFn<F>(pub F);

#[async_trait]
impl<F> ReloadHook for ReloadFn<F>
where
    F: Fn() -> Result<(), ReloadError> + Send + Sync,
{
    async fn on_database_replaced(&self) -> Result<(), ReloadError> {
        (self.0)()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    Idle,
    Fetching,
    Validating,
    Swapping,
    Reloading,
    Done,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RestoreStage::Idle => "idle",
            RestoreStage::Fetching => "fetching",
            RestoreStage::Validating => "validating",
            RestoreStage::Swapping => "swapping",
            RestoreStage::Reloading => "reloading",
            RestoreStage::Done => "done",
        };
        f.write_str(label)
    }
}

/// Claim on one live database file; released on drop.
struct InFlight(PathBuf);

impl InFlight {
    fn acquire(live: &Path) -> Option<Self> {
        let mut restoring = RESTORING.lock().unwrap_or_else(PoisonError::into_inner);
        restoring
            .insert(live.to_path_buf())
            .then(|| Self(live.to_path_buf()))
    }

    fn held(live: &Path) -> bool {
        RESTORING
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(live)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        RESTORING
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

/// Publishes the stage of the running restore; falls back to `Idle` unless it finished.
struct StageTracker {
    stage: Arc<Mutex<RestoreStage>>,
    snapshot: String,
}

impl StageTracker {
    fn enter(&self, next: RestoreStage) {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::info!(snapshot = %self.snapshot, stage = %next, "restore stage");
    }
}

impl Drop for StageTracker {
    fn drop(&mut self) {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        if *stage != RestoreStage::Done {
            *stage = RestoreStage::Idle;
        }
    }
}

/// Restores snapshots over one live database.
///
/// Any number of coordinators may exist; at most one restore per live file runs at a time.
#[derive(Clone)]
pub struct RestoreCoordinator {
    database: Arc<dyn Database>,
    reload: Arc<dyn ReloadHook>,
    stage: Arc<Mutex<RestoreStage>>,
}

impl RestoreCoordinator {
    pub fn new(database: Arc<dyn Database>, reload: Arc<dyn ReloadHook>) -> Self {
        Self {
            database,
            reload,
            stage: Arc::new(Mutex::new(RestoreStage::Idle)),
        }
    }

    pub fn current_stage(&self) -> RestoreStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any restore, from this coordinator or another, targets the live file.
    pub fn is_restoring(&self) -> bool {
        InFlight::held(self.database.live_path())
    }

    /// Restores `name` from `backend` over the live database.
    ///
    /// Dropping the returned future during fetching or validating has no effect. From the
    /// swap on, swapping and reloading run on a detached task that finishes regardless.
    pub async fn restore(&self, backend: &dyn StorageBackend, name: &str) -> Result<(), RestoreError> {
        let Some(slot) = InFlight::acquire(self.database.live_path()) else {
            tracing::warn!(snapshot = name, "restore rejected, another restore is running");
            return Err(RestoreError::InProgress);
        };
        let tracker = StageTracker {
            stage: Arc::clone(&self.stage),
            snapshot: name.to_string(),
        };
        let kind = backend.kind();

        tracker.enter(RestoreStage::Fetching);
        let blob = backend.read(name).await.map_err(|err| {
            tracing::warn!(backend = %kind, snapshot = name, error = %err, "snapshot fetch failed");
            RestoreError::Backend(err)
        })?;

        tracker.enter(RestoreStage::Validating);
        let payload = SnapshotCodec::decode(&blob)
            .map_err(|err| {
                tracing::warn!(backend = %kind, snapshot = name, error = %err, "snapshot rejected");
                RestoreError::CorruptSnapshot(err.to_string())
            })?
            .to_vec();
        drop(blob);

        let replace = tokio::spawn(replace_live(
            Arc::clone(&self.database),
            Arc::clone(&self.reload),
            payload,
            tracker,
            slot,
        ));
        replace
            .await
            .map_err(|err| RestoreError::Swap(io::Error::new(io::ErrorKind::Other, err)))??;

        tracing::info!(backend = %kind, snapshot = name, "restore complete");
        Ok(())
    }
}

/// Swaps `payload` in and reloads, with writers frozen for the whole span.
async fn replace_live(
    database: Arc<dyn Database>,
    reload: Arc<dyn ReloadHook>,
    payload: Vec<u8>,
    tracker: StageTracker,
    _slot: InFlight,
) -> Result<(), RestoreError> {
    tracker.enter(RestoreStage::Swapping);
    let freeze = database.freeze_writers().await;
    let live = database.live_path().to_path_buf();
    tokio::task::spawn_blocking(move || swap_in(&live, &payload))
        .await
        .map_err(|err| RestoreError::Swap(io::Error::new(io::ErrorKind::Other, err)))?
        .map_err(|err| {
            tracing::error!(
                snapshot = %tracker.snapshot,
                error = %err,
                "database swap failed, live file unchanged"
            );
            RestoreError::Swap(err)
        })?;

    tracker.enter(RestoreStage::Reloading);
    let reloaded = reload.on_database_replaced().await;
    drop(freeze);
    tracker.enter(RestoreStage::Done);
    reloaded.map_err(|err| {
        tracing::error!(snapshot = %tracker.snapshot, error = %err, "database replaced but reload failed");
        RestoreError::ReloadFailed(err)
    })
}

/// Writes `payload` beside `live` and renames it over the live file.
fn swap_in(live: &Path, payload: &[u8]) -> io::Result<()> {
    StagedFile::stage(live, payload)?.commit()
}
