//! Storage configuration and path management for the Gambit clients.
//!
//! `StorageConfig` is the single place that decides where client-side state
//! lives on disk: the persisted session token, the optional config file and
//! the console's log directory.
//!
//! Production code uses `StorageConfig::default()` which points to `~/.gambit/`.
//! Tests use `StorageConfig::with_root(temp_dir)` for isolation.

use std::path::{Path, PathBuf};

const ROOT_DIR_NAME: &str = ".gambit";
const ROOT_ENV: &str = "GAMBIT_HOME";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        if let Some(root) = std::env::var_os(ROOT_ENV).filter(|value| !value.is_empty()) {
            return Self {
                root: PathBuf::from(root),
            };
        }
        let root = dirs::home_dir()
            .map(|home| home.join(ROOT_DIR_NAME))
            .unwrap_or_else(|| std::env::temp_dir().join(ROOT_DIR_NAME));
        Self { root }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the persisted bearer token.
    pub fn token_file(&self) -> PathBuf {
        self.root.join("access_token")
    }

    /// Path to config.json (client preferences).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
