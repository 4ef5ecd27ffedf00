#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use backup_core::{
    config::{Config, ConfigManager},
    oauth::StaticTokenAuthorizer,
    service::BackupService,
};
use once_cell::sync::Lazy;
use tempfile::TempDir;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Creates an isolated application home that lives until the test binary exits.
pub fn test_home() -> PathBuf {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    base
}

/// Config whose platform-synced folder stays inside `home`.
pub fn test_config(home: &Path) -> Config {
    Config {
        cloud_sync_dir: Some(home.join("mirror")),
        ..Config::default()
    }
}

/// Writes the test config into `home` so the CLI picks it up.
pub fn write_test_config(home: &Path) {
    let manager = ConfigManager::with_base_dir(home.to_path_buf()).expect("config manager");
    manager.save(&test_config(home)).expect("save config");
}

pub fn open_service(home: &Path) -> BackupService {
    BackupService::open(
        &test_config(home),
        home,
        Arc::new(StaticTokenAuthorizer::new(None)),
    )
    .expect("open backup service")
}

pub async fn titles(service: &BackupService) -> Vec<String> {
    service
        .store()
        .records()
        .await
        .into_iter()
        .map(|record| record.title)
        .collect()
}
