use crate::defaults;
use crate::error::{FacecueError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub delivery: DeliveryConfig,
    pub session: SessionConfig,
}

/// Detection worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL the classification models are loaded from.
    pub models_url: String,
    /// Detection interval assumed for the `webgl` backend.
    pub webgl_interval_ms: u64,
    /// Detection interval assumed for the `cpu` backend.
    pub cpu_interval_ms: u64,
}

/// Webhook delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Webhook proxy base URL. `None` means delivery is not configured.
    pub webhook_url: Option<String>,
    /// Bearer token sent with each delivery.
    pub jwt: Option<String>,
    /// Period of the delivery tick.
    pub tick_ms: u64,
}

/// Identity of the conference session attached to each webhook batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SessionConfig {
    pub meeting_fqn: String,
    pub session_id: String,
    pub participant_id: String,
    pub participant_name: String,
    pub participant_jid: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            models_url: defaults::DEFAULT_MODELS_URL.to_string(),
            webgl_interval_ms: defaults::WEBGL_INTERVAL_MS,
            cpu_interval_ms: defaults::CPU_INTERVAL_MS,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            jwt: None,
            tick_ms: defaults::WEBHOOK_TICK_MS,
        }
    }
}

impl DeliveryConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - FACECUE_MODELS_URL → worker.models_url
    /// - FACECUE_WEBHOOK_URL → delivery.webhook_url
    /// - FACECUE_JWT → delivery.jwt
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("FACECUE_MODELS_URL")
            && !url.is_empty()
        {
            self.worker.models_url = url;
        }

        if let Ok(url) = std::env::var("FACECUE_WEBHOOK_URL")
            && !url.is_empty()
        {
            self.delivery.webhook_url = Some(url);
        }

        if let Ok(jwt) = std::env::var("FACECUE_JWT")
            && !jwt.is_empty()
        {
            self.delivery.jwt = Some(jwt);
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.delivery.tick_ms == 0 {
            return Err(FacecueError::ConfigInvalidValue {
                key: "delivery.tick_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.worker.webgl_interval_ms == 0 {
            return Err(FacecueError::ConfigInvalidValue {
                key: "worker.webgl_interval_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.worker.cpu_interval_ms == 0 {
            return Err(FacecueError::ConfigInvalidValue {
                key: "worker.cpu_interval_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(url) = &self.delivery.webhook_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(FacecueError::ConfigInvalidValue {
                key: "delivery.webhook_url".to_string(),
                message: format!("expected an http(s) URL, got '{}'", url),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/facecue/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("facecue").join("config.toml"))
            .ok_or_else(|| FacecueError::Other("Could not determine config directory".to_string()))
    }
}
