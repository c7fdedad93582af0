//! Configuration file structures for the playground.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`PersistenceConfig`]: Where and how often session state is saved
//! - [`SessionDefaults`]: Command and version used for a fresh session

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// optimize = true
/// cache_compiled_modules = true
///
/// [runtime.execution]
/// argv0 = "js"
/// output_dir = "dist"
///
/// [runtime.artifact]
/// url_template = "https://cdn.jsdelivr.net/npm/tsgo-wasm@{version}/tsgo.wasm"
/// prewarm = "latest"
///
/// [persistence]
/// storage_path = ".playground/storage.json"
/// debounce_ms = 300
///
/// [session]
/// command = "tsc"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution + artifact settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Session persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Defaults for a fresh session.
    #[serde(default)]
    pub session: SessionDefaults,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Session persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// File standing in for browser local storage.
    #[serde(default = "defaults::storage_path")]
    pub storage_path: String,

    /// Quiet period after the last edit before state is written.
    #[serde(default = "defaults::debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_path: defaults::storage_path(),
            debounce_ms: defaults::debounce_ms(),
        }
    }
}

impl PersistenceConfig {
    /// Get the debounce period as a `Duration`.
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

/// Defaults for a session that could not be hydrated.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionDefaults {
    /// Command line.
    #[serde(default = "defaults::command")]
    pub command: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            command: defaults::command(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn storage_path() -> String {
        ".playground/storage.json".to_string()
    }

    pub const fn debounce_ms() -> u64 {
        300
    }

    pub fn command() -> String {
        "tsc".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.persistence.storage_path, ".playground/storage.json");
        assert_eq!(config.persistence.debounce_ms, 300);
        assert_eq!(config.session.command, "tsc");
        assert_eq!(config.runtime.artifact.default_version, "latest");
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [persistence]
            debounce_ms = 50
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.persistence.debounce_ms, 50);
        // Defaults applied
        assert_eq!(config.persistence.storage_path, ".playground/storage.json");
        assert_eq!(config.runtime.execution.mount_point, "/app");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [runtime.engine]
            optimize = false
            cache_compiled_modules = true

            [runtime.execution]
            argv0 = "tsgo"
            output_dir = "out"
            stream_capacity_kb = 64

            [runtime.artifact]
            url_template = "https://mirror.example/{version}/tsgo.wasm"
            default_version = "2025.3.14"
            prewarm = "2025.3.14"

            [persistence]
            storage_path = "/tmp/state.json"
            debounce_ms = 1000

            [session]
            command = "tsc --noEmit"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert!(!config.runtime.engine.optimize);
        assert!(config.runtime.engine.cache_compiled_modules);
        assert_eq!(config.runtime.execution.argv0, "tsgo");
        assert_eq!(config.runtime.execution.output_dir, "out");
        assert_eq!(config.runtime.execution.stream_capacity(), 64 * 1024);
        assert_eq!(
            config.runtime.artifact.direct_url("1"),
            "https://mirror.example/1/tsgo.wasm"
        );
        assert_eq!(config.runtime.artifact.prewarm.as_deref(), Some("2025.3.14"));
        assert_eq!(config.persistence.storage_path, "/tmp/state.json");
        assert_eq!(
            config.persistence.debounce(),
            std::time::Duration::from_secs(1)
        );
        assert_eq!(config.session.command, "tsc --noEmit");
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(result.is_err());
    }
}
