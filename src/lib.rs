#![doc(test(attr(deny(warnings))))]

//! Backup Core captures the application's embedded database into versioned snapshots,
//! stores them on local, platform-synced or OAuth cloud storage, and restores them
//! with an atomic swap of the live database file.

pub mod backup;
pub mod catalog;
pub mod cli;
pub mod clock;
pub mod codec;
pub mod config;
pub mod database;
pub mod errors;
pub mod naming;
pub mod oauth;
pub mod restore;
pub mod service;
pub mod storage;
pub mod utils;

pub use backup::{BackupCoordinator, SnapshotId};
pub use catalog::{BackupCatalog, SnapshotInfo};
pub use restore::{ReloadHook, RestoreCoordinator, RestoreStage};
pub use service::BackupService;
pub use storage::{StorageBackend, StorageBackendKind};

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Backup Core tracing initialized.");
    });
}
