//! Configuration management for Prism.
//!
//! Configuration is loaded from a platform config directory with
//! sensible defaults; a missing file means defaults. The loaded
//! `Config` is built into a [`Prism`](crate::Prism) instance once at
//! startup and read-only from then on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration structure for Prism.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Record store / queue database
    pub database: DatabaseConfig,

    /// Named storage backends
    pub storage: StorageConfig,

    /// Output encoding and naming
    pub output: OutputConfig,

    /// Work queue and worker settings
    pub queue: QueueConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file (with ~ expansion)
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "~/.prism/prism.db".to_string(),
        }
    }
}

/// One filesystem storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Directory the backend is rooted at (with ~ expansion)
    pub root: String,
    /// URL prefix for blobs in this backend
    pub base_url: String,
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Named backends; must include `default`. A backend named
    /// `generated` receives output blobs when present.
    pub backends: BTreeMap<String, BackendConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "default".to_string(),
            BackendConfig {
                root: "./media".to_string(),
                base_url: "/media/".to_string(),
            },
        );
        StorageConfig { backends }
    }
}

/// Output encoding and naming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Extension for opaque output
    pub opaque_extension: String,

    /// Extension for transparent output
    pub transparent_extension: String,

    /// Lossy encode quality (1-100)
    pub quality: u8,

    /// Infix template for high-resolution variants
    pub highres_infix: String,

    /// Placeholder URL served while a variant is still generating;
    /// falls back to the source URL when unset
    pub placeholder_url: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            opaque_extension: ".jpg".to_string(),
            transparent_extension: ".png".to_string(),
            quality: 85,
            highres_infix: "@{highres}x".to_string(),
            placeholder_url: None,
        }
    }
}

/// Queue and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Route generation through the queue instead of inline
    pub queued: bool,

    /// Maximum actions claimed per drain pass
    pub drain_limit: usize,

    /// Worker poll interval when the queue is empty
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            queued: false,
            drain_limit: 120,
            poll_interval_ms: 1000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log format: pretty or json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Platform config dir (e.g. ~/.config/prism/config.toml on
    /// Linux), falling back to ~/.prism/config.toml.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "prism", "prism")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".prism").join("config.toml")
            })
    }

    /// The resolved database path (with ~ expansion).
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database.path).into_owned())
    }

    /// The resolved root for a backend (with ~ expansion).
    pub fn backend_root(backend: &BackendConfig) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&backend.root).into_owned())
    }

    /// Check configuration values for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.quality == 0 || self.output.quality > 100 {
            return Err(ConfigError::ValidationError(format!(
                "output.quality must be 1-100, got {}",
                self.output.quality
            )));
        }
        for (label, ext) in [
            ("opaque_extension", &self.output.opaque_extension),
            ("transparent_extension", &self.output.transparent_extension),
        ] {
            if !ext.starts_with('.') {
                return Err(ConfigError::ValidationError(format!(
                    "output.{label} must start with '.', got {ext:?}"
                )));
            }
        }
        if !self.storage.backends.contains_key("default") {
            return Err(ConfigError::ValidationError(
                "storage.backends must include a \"default\" backend".to_string(),
            ));
        }
        if self.queue.drain_limit == 0 {
            return Err(ConfigError::ValidationError(
                "queue.drain_limit must be at least 1".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "logging.format must be \"pretty\" or \"json\", got {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
