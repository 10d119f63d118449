//! TOML runtime settings for the server binary.
//!
//! These are machine-local knobs — where to listen, where the screen map
//! lives, how chatty the logs are.  The screen map itself (screens, aliases,
//! links) is a separate file in the line-oriented format parsed by
//! [`screenlink_core::ScreenConfig`]; swapping the map at runtime does not
//! touch these settings.
//!
//! Fields carry serde defaults so a partial (or absent) file works on first
//! run and across upgrades.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for settings-file operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub network: NetworkSettings,
}

/// Identity and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Screen name this server goes by; defaults to the local hostname.
    #[serde(default)]
    pub name: Option<String>,
    /// Path to the screen-map file.
    #[serde(default = "default_map")]
    pub map: PathBuf,
    /// `tracing` log level: `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Listen addresses and bind behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSettings {
    /// Client listen address, `host:port`; overrides the map's `address`
    /// option when set.
    #[serde(default)]
    pub address: Option<String>,
    /// Admin listen address; the admin endpoint is disabled when absent.
    #[serde(default)]
    pub admin_address: Option<String>,
    /// Total time to keep retrying a busy listen address, in seconds.
    #[serde(default = "default_bind_timeout_secs")]
    pub bind_timeout_secs: u64,
}

fn default_map() -> PathBuf {
    PathBuf::from("screenlink.conf")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_timeout_secs() -> u64 {
    5 * 60
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: None,
            map: default_map(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            address: None,
            admin_address: None,
            bind_timeout_secs: default_bind_timeout_secs(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Io`] for file-system errors other than "not found",
    /// [`SettingsError::Parse`] for malformed TOML.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(SettingsError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}
