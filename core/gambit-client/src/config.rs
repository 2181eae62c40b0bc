//! Client configuration loading.
//!
//! Values resolve in order: built-in defaults, `config.json` under the
//! storage root (if present), then environment overrides.

use crate::error::{ClientError, Result};
use crate::storage::StorageConfig;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_BASE_URL: &str = "ws://localhost:8000";
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const API_URL_ENV: &str = "GAMBIT_API_BASE_URL";
const WS_URL_ENV: &str = "GAMBIT_WS_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub reconnect_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Loads the configuration for `storage`, applying environment overrides.
    ///
    /// A missing config file is not an error; a malformed one is.
    pub fn load(storage: &StorageConfig) -> Result<Self> {
        let path = storage.config_file();
        let mut config = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|err| {
                ClientError::Config(format!("{}: {}", path.display(), err))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(ClientError::Storage {
                    path,
                    source: err,
                })
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(value) = env_override(API_URL_ENV) {
            self.api_base_url = value;
        }
        if let Some(value) = env_override(WS_URL_ENV) {
            self.ws_base_url = value;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.api_base()?;
        self.ws_base()?;
        if self.reconnect_interval_ms == 0 {
            return Err(ClientError::Config(
                "reconnect_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn api_base(&self) -> Result<Url> {
        parse_base(&self.api_base_url, &["http", "https"])
    }

    pub fn ws_base(&self) -> Result<Url> {
        // Plain ws only: the realtime connector has no TLS support.
        parse_base(&self.ws_base_url, &["ws"])
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_base(raw: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|err| ClientError::Config(format!("invalid base URL '{}': {}", raw, err)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ClientError::Config(format!(
            "base URL '{}' must use one of: {}",
            raw,
            schemes.join(", ")
        )));
    }
    if url.cannot_be_a_base() {
        return Err(ClientError::Config(format!(
            "base URL '{}' cannot carry a path",
            raw
        )));
    }
    Ok(url)
}
