//! Configuration structures for the playground runtime.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (optimization, caching)
//! - [`ExecutionConfig`]: Per-invocation process settings (argv, mount point)
//! - [`ArtifactConfig`]: Where compiler modules are downloaded from

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// This structure contains all configuration options for the execution side.
/// It can be loaded from TOML (see [`crate::config_file`]) or JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-invocation execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Compiler module download configuration.
    #[serde(default)]
    pub artifact: ArtifactConfig,
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Compile modules with Cranelift's speed optimizations.
    ///
    /// Compiler modules are large; disabling this trades run time for a
    /// faster first compile.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,

    /// Compile functions of a module on multiple threads.
    #[serde(default = "defaults::parallel_compilation")]
    pub parallel_compilation: bool,

    /// Enable Wasmtime's on-disk cache of compiled machine code.
    ///
    /// This survives restarts, unlike the in-memory module cache which lives
    /// for one worker lifetime.
    #[serde(default)]
    pub cache_compiled_modules: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize: defaults::optimize(),
            parallel_compilation: defaults::parallel_compilation(),
            cache_compiled_modules: false,
        }
    }
}

/// Per-invocation execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// First element of the guest argument vector.
    #[serde(default = "defaults::argv0")]
    pub argv0: String,

    /// Guest path the staged files are mounted at.
    #[serde(default = "defaults::mount_point")]
    pub mount_point: String,

    /// Directory under the mount point that holds compiler output.
    #[serde(default = "defaults::output_dir")]
    pub output_dir: String,

    /// Capacity of each captured output stream in kilobytes.
    ///
    /// Output beyond this is dropped.
    #[serde(default = "defaults::stream_capacity_kb")]
    pub stream_capacity_kb: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            argv0: defaults::argv0(),
            mount_point: defaults::mount_point(),
            output_dir: defaults::output_dir(),
            stream_capacity_kb: defaults::stream_capacity_kb(),
        }
    }
}

impl ExecutionConfig {
    /// Get the stream capacity in bytes.
    pub fn stream_capacity(&self) -> usize {
        self.stream_capacity_kb.saturating_mul(1024)
    }
}

/// Compiler module download configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    /// URL of a versioned module; `{version}` is replaced by the version.
    #[serde(default = "defaults::url_template")]
    pub url_template: String,

    /// Base URL of the package registry used for manifest lookups.
    #[serde(default = "defaults::registry_url")]
    pub registry_url: String,

    /// Package name in the registry.
    #[serde(default = "defaults::package")]
    pub package: String,

    /// File name of the module inside a package tarball.
    #[serde(default = "defaults::module_filename")]
    pub module_filename: String,

    /// Version used when none is chosen.
    #[serde(default = "defaults::default_version")]
    pub default_version: String,

    /// Version to resolve at worker startup, before signalling readiness.
    #[serde(default)]
    pub prewarm: Option<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            url_template: defaults::url_template(),
            registry_url: defaults::registry_url(),
            package: defaults::package(),
            module_filename: defaults::module_filename(),
            default_version: defaults::default_version(),
            prewarm: None,
        }
    }
}

impl ArtifactConfig {
    /// URL of the module artifact for a version.
    pub fn direct_url(&self, version: &str) -> String {
        self.url_template.replace("{version}", version)
    }

    /// URL of the registry document describing a version.
    pub fn registry_document_url(&self, version: &str) -> String {
        format!(
            "{}/{}/{}",
            self.registry_url.trim_end_matches('/'),
            self.package,
            version
        )
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn optimize() -> bool {
        true
    }

    pub const fn parallel_compilation() -> bool {
        true
    }

    pub fn argv0() -> String {
        "js".to_string()
    }

    pub fn mount_point() -> String {
        "/app".to_string()
    }

    pub fn output_dir() -> String {
        "dist".to_string()
    }

    pub const fn stream_capacity_kb() -> usize {
        4096
    }

    pub fn url_template() -> String {
        "https://cdn.jsdelivr.net/npm/tsgo-wasm@{version}/tsgo.wasm".to_string()
    }

    pub fn registry_url() -> String {
        "https://registry.npmjs.org".to_string()
    }

    pub fn package() -> String {
        "tsgo-wasm".to_string()
    }

    pub fn module_filename() -> String {
        "tsgo.wasm".to_string()
    }

    pub fn default_version() -> String {
        "latest".to_string()
    }
}
