//! Configuration loading and daemon paths

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default config file name, resolved relative to the working directory.
pub const CONFIG_FILE: &str = "configuration.json";

/// Environment fallbacks for the app-level API credentials.
pub const API_ID_ENV: &str = "TG_API_ID";
pub const API_HASH_ENV: &str = "TG_API_HASH";

fn default_gateway_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_fatal_on_empty_fetch() -> bool {
    true
}

/// One forwarding pair, both sides given as channel display names.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardPair {
    pub source_group: String,
    pub target_group: String,
}

/// Declarative daemon configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub phone: String,

    /// Polling interval in seconds; doubles as the freshness window.
    pub refresh_rate: u64,

    pub groups: Vec<ForwardPair>,

    /// App-level API credentials; fall back to TG_API_ID / TG_API_HASH.
    #[serde(default)]
    pub api_id: Option<i64>,
    #[serde(default)]
    pub api_hash: Option<String>,

    /// Local MTProto gateway the client talks to.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Whether an empty fetch result is escalated to a fatal error.
    #[serde(default = "default_fatal_on_empty_fetch")]
    pub fatal_on_empty_fetch: bool,
}

impl Config {
    /// Load and validate the JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("config file {} unreadable: {}", path.display(), e))
        })?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("bad JSON syntax: {}", e)))?;

        if config.api_id.is_none() {
            config.api_id = std::env::var(API_ID_ENV).ok().and_then(|v| v.parse().ok());
        }
        if config.api_hash.is_none() {
            config.api_hash = std::env::var(API_HASH_ENV).ok();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.phone.is_empty() {
            return Err(Error::Config("phone must not be empty".to_string()));
        }
        if self.refresh_rate == 0 {
            return Err(Error::Config("refresh_rate must be positive".to_string()));
        }
        if self.groups.is_empty() {
            return Err(Error::Config("no forwarding pairs configured".to_string()));
        }
        Ok(())
    }

    /// API credentials, erroring if neither config nor environment has them.
    pub fn api_credentials(&self) -> Result<(i64, &str)> {
        let id = self
            .api_id
            .ok_or_else(|| Error::Config(format!("api_id missing (set it or {})", API_ID_ENV)))?;
        let hash = self.api_hash.as_deref().ok_or_else(|| {
            Error::Config(format!("api_hash missing (set it or {})", API_HASH_ENV))
        })?;
        Ok((id, hash))
    }
}

/// Runtime paths for daemon management (pid file, logs).
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let base = home.join(".telegram-relay");
        Self {
            state_dir: base.join("state"),
            logs_dir: base.join("logs"),
        }
    }
}

impl Paths {
    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join("daemon.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir.join("relay.log")
    }

    /// Create paths rooted at a custom directory (used by tests).
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            state_dir: base.join("state"),
            logs_dir: base.join("logs"),
        }
    }
}
