use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

const HOME_ENV: &str = "BACKUP_CORE_HOME";
const DEFAULT_DIR_NAME: &str = ".backup_core";
const CLOUD_SYNC_DIR_NAME: &str = "BackupCore";

/// Returns the application data directory, defaulting to `~/.backup_core`.
pub fn app_data_dir() -> PathBuf {
    if let Some(custom) = env::var_os(HOME_ENV) {
        return PathBuf::from(custom);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}

/// User-tunable settings for the backup subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Live database file. Defaults to `<home>/data/records.db`.
    pub database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    /// Local backup folder. Defaults to `<home>/backups`.
    pub local_backup_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    /// Folder mirrored by the platform to the user's cloud account.
    pub cloud_sync_dir: Option<PathBuf>,

    #[serde(default)]
    pub oauth: OAuthConfig,

    #[serde(default = "Config::default_snapshot_lock_wait_ms")]
    pub snapshot_lock_wait_ms: u64,

    #[serde(default = "Config::default_max_name_attempts")]
    pub max_name_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            local_backup_dir: None,
            cloud_sync_dir: None,
            oauth: OAuthConfig::default(),
            snapshot_lock_wait_ms: Self::default_snapshot_lock_wait_ms(),
            max_name_attempts: Self::default_max_name_attempts(),
        }
    }
}

impl Config {
    pub fn default_snapshot_lock_wait_ms() -> u64 {
        2_000
    }

    pub fn default_max_name_attempts() -> usize {
        16
    }

    pub fn resolve_database_path(&self, home: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| home.join("data").join("records.db"))
    }

    pub fn resolve_local_backup_dir(&self, home: &Path) -> PathBuf {
        self.local_backup_dir
            .clone()
            .unwrap_or_else(|| home.join("backups"))
    }

    pub fn resolve_cloud_sync_dir(&self) -> PathBuf {
        if let Some(path) = &self.cloud_sync_dir {
            return path.clone();
        }

        let base = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        base.join(CLOUD_SYNC_DIR_NAME)
    }

    pub fn resolve_token_file(&self, home: &Path) -> PathBuf {
        self.oauth
            .token_file
            .clone()
            .unwrap_or_else(|| home.join("oauth_token.json"))
    }

    pub fn snapshot_lock_wait(&self) -> Duration {
        Duration::from_millis(self.snapshot_lock_wait_ms)
    }
}

/// Connection settings for the OAuth cloud-storage service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "OAuthConfig::default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "OAuthConfig::default_content_base_url")]
    pub content_base_url: String,
    /// Folder inside the account's app space that holds snapshots.
    #[serde(default = "OAuthConfig::default_remote_folder")]
    pub remote_folder: String,
    #[serde(default = "OAuthConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: Self::default_api_base_url(),
            content_base_url: Self::default_content_base_url(),
            remote_folder: Self::default_remote_folder(),
            request_timeout_secs: Self::default_request_timeout_secs(),
            token_file: None,
        }
    }
}

impl OAuthConfig {
    pub fn default_api_base_url() -> String {
        "https://api.dropboxapi.com".into()
    }

    pub fn default_content_base_url() -> String {
        "https://content.dropboxapi.com".into()
    }

    pub fn default_remote_folder() -> String {
        "/backups".into()
    }

    pub fn default_request_timeout_secs() -> u64 {
        30
    }

    /// Same service reached through a single base URL; used against local mock servers.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        Self {
            api_base_url: base.clone(),
            content_base_url: base,
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"oauth":{"remote_folder":"/vault"}}"#).expect("parse config");
        assert_eq!(config.oauth.remote_folder, "/vault");
        assert_eq!(config.oauth.request_timeout_secs, 30);
        assert_eq!(config.max_name_attempts, 16);
        assert_eq!(config.snapshot_lock_wait(), Duration::from_secs(2));
    }

    #[test]
    fn paths_resolve_under_home_unless_overridden() {
        let home = Path::new("/tmp/backup-home");
        let mut config = Config::default();
        assert_eq!(
            config.resolve_database_path(home),
            home.join("data").join("records.db")
        );
        config.local_backup_dir = Some(PathBuf::from("/srv/snapshots"));
        assert_eq!(
            config.resolve_local_backup_dir(home),
            PathBuf::from("/srv/snapshots")
        );
    }
}
