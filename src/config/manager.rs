use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{Config, ConfigError};
use crate::utils::persistence::write_atomic;

/// Handles persistence of [`Config`] under the application home directory.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    home: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn with_base_dir(home: PathBuf) -> Result<Self, ConfigError> {
        let config_dir = home.join("config");
        fs::create_dir_all(&config_dir)?;
        let config_path = config_dir.join("config.json");
        Ok(Self { home, config_path })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        if self.config_path.exists() {
            let data = fs::read_to_string(&self.config_path)?;
            serde_json::from_str(&data).map_err(|err| ConfigError::Serde(err.to_string()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(config)
            .map_err(|err| ConfigError::Serde(err.to_string()))?;
        write_atomic(&self.config_path, json.as_bytes())?;
        Ok(())
    }
}
