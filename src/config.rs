//! Layered configuration for the watcher.
//!
//! Sources, lowest precedence first:
//! - Default values
//! - `treewatch.toml` in the current directory (or a file given to `load_from`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TREEWATCH_` and use double
//! underscores to separate nested levels:
//! - `TREEWATCH_WATCH__BUFFER_CAPACITY=256` sets `watch.buffer_capacity`
//! - `TREEWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::watcher::{DEFAULT_RAW_CAPACITY, EventKinds, WatchError};

/// File looked up by [`Settings::load`].
pub const CONFIG_FILE: &str = "treewatch.toml";

const ENV_PREFIX: &str = "TREEWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Watch defaults
    #[serde(default)]
    pub watch: WatchConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Event kinds delivered to the stream, by name
    #[serde(default = "default_mask")]
    pub mask: Vec<String>,

    /// Bound of every node's output buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Bound of the channel between the native watcher thread and a node
    #[serde(default = "default_raw_channel_capacity")]
    pub raw_channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for everything without an explicit override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `treewatch = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_mask() -> Vec<String> {
    ["created", "deleted", "modified", "moved"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_buffer_capacity() -> usize {
    64
}
fn default_raw_channel_capacity() -> usize {
    DEFAULT_RAW_CAPACITY
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mask: default_mask(),
            buffer_capacity: default_buffer_capacity(),
            raw_channel_capacity: default_raw_channel_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchConfig {
    /// The configured mask as event kind bits.
    pub fn mask(&self) -> Result<EventKinds, WatchError> {
        self.mask
            .iter()
            .try_fold(EventKinds::empty(), |acc, name| {
                Ok(acc | EventKinds::from_kind_name(name)?)
            })
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(PathBuf::from(CONFIG_FILE))
    }

    /// Load configuration from a specific file, with environment overrides.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels,
            // single underscore stays within field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watch.buffer_capacity, 64);
        assert_eq!(settings.watch.raw_channel_capacity, 100);
        assert_eq!(settings.logging.default, "warn");
        assert_eq!(
            settings.watch.mask().unwrap(),
            EventKinds::CREATED | EventKinds::DELETED | EventKinds::MODIFIED | EventKinds::MOVED
        );
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("treewatch.toml");

        let toml_content = r#"
version = 2

[watch]
mask = ["created", "delete-self"]
raw_channel_capacity = 10

[logging]
default = "info"

[logging.modules]
treewatch = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(
            settings.watch.mask().unwrap(),
            EventKinds::CREATED | EventKinds::DELETE_SELF
        );
        assert_eq!(settings.watch.raw_channel_capacity, 10);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["treewatch"], "debug");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.watch.mask, default_mask());
        assert_eq!(settings.logging, LoggingConfig::default());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/treewatch.toml");

        let mut settings = Settings::default();
        settings.watch.raw_channel_capacity = 7;
        settings.watch.mask = vec!["modified".to_string()];

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watch.raw_channel_capacity, 7);
        assert_eq!(loaded.watch.mask().unwrap(), EventKinds::MODIFIED);
    }

    #[test]
    fn test_unknown_mask_name() {
        let config = WatchConfig {
            mask: vec!["created".to_string(), "exploded".to_string()],
            ..WatchConfig::default()
        };
        assert!(matches!(
            config.mask(),
            Err(WatchError::UnknownKind { name }) if name == "exploded"
        ));
    }
}
