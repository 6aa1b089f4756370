//! Console-side settings: where the backend lives and how often to poll it.
//!
//! Distinct from [`verigate_core::Configuration`], which is the backend's
//! shared pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::RefreshPolicies;
use crate::error::SyncError;

/// Loaded from TOML; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    /// Refresh interval for stats and providers.
    #[serde(default = "default_collection_refresh_ms")]
    pub collection_refresh_ms: u64,

    #[serde(default = "default_log_refresh_ms")]
    pub log_refresh_ms: u64,

    /// Where report exports are written.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_api_base_url() -> String {
    "http://localhost:8001/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_job_poll_interval_ms() -> u64 {
    2000
}

fn default_collection_refresh_ms() -> u64 {
    5000
}

fn default_log_refresh_ms() -> u64 {
    2000
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            job_poll_interval_ms: default_job_poll_interval_ms(),
            collection_refresh_ms: default_collection_refresh_ms(),
            log_refresh_ms: default_log_refresh_ms(),
            export_dir: default_export_dir(),
        }
    }
}

/// Values given on the command line or in the environment; they win over the
/// file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub export_dir: Option<PathBuf>,
}

impl ConsoleConfig {
    pub fn from_toml(text: &str) -> Result<Self, SyncError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SyncError::ConsoleConfig(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` when given, otherwise start from defaults, then apply
    /// `overrides`.
    pub async fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, SyncError> {
        let mut config = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    SyncError::ConsoleConfig(format!("failed to read {}: {e}", path.display()))
                })?;
                let config = Self::from_toml(&text)?;
                info!(path = %path.display(), "loaded console configuration");
                config
            }
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.api_base_url {
            self.api_base_url = url;
        }
        if let Some(dir) = overrides.export_dir {
            self.export_dir = dir;
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.api_base_url.trim().is_empty() {
            return Err(SyncError::ConsoleConfig("api_base_url is empty".into()));
        }
        for (name, value) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("job_poll_interval_ms", self.job_poll_interval_ms),
            ("collection_refresh_ms", self.collection_refresh_ms),
            ("log_refresh_ms", self.log_refresh_ms),
        ] {
            if value == 0 {
                return Err(SyncError::ConsoleConfig(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn refresh_policies(&self) -> RefreshPolicies {
        RefreshPolicies {
            collections: Duration::from_millis(self.collection_refresh_ms),
            logs: Duration::from_millis(self.log_refresh_ms),
        }
    }
}
