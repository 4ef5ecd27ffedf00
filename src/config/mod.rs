//! Persistent configuration for the backup subsystem: where the live database
//! lives, where each storage backend writes, and how to reach the cloud service.

pub mod manager;
pub mod model;

use std::io;

use thiserror::Error;

pub use manager::ConfigManager;
pub use model::{Config, OAuthConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serde(String),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}
