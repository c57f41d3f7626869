//! Service Settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `MILEAGE__*` environment variables
//! (e.g. `MILEAGE__SERVER__PORT=9090`, `MILEAGE__MILEAGE__FILTER__MAX_ACCURACY_M=50`).

use alerting::AlertConfig;
use config::{Config, ConfigError, Environment, File};
use mileage::MileageConfig;
use serde::{Deserialize, Serialize};

/// Default settings file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "mileage.toml";

/// Environment variable naming an alternative settings file
pub const CONFIG_PATH_ENV: &str = "MILEAGE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub mileage: MileageConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Storage backend selection.
///
/// Without a URL the service keeps everything in memory, which is only
/// useful for demos and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite URL, e.g. `sqlite://mileage.db?mode=rwc`
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Max level: trace, debug, info, warn or error
    pub level: String,
    /// Emit one JSON object per line instead of human-readable text
    pub json: bool,
    pub with_target: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl Settings {
    /// Load from `$MILEAGE_CONFIG` (or `mileage.toml`) plus the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load from an optional file at `path` plus the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("MILEAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
