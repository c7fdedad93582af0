//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the execution side. It is:
//! - Thread-safe and shared by the module cache and the process invoker
//! - Configured for async execution so guest runs never block the worker
//! - Created once per worker and dropped with it

use tracing::{debug, info};
use wasmtime::{Config, Engine, OptLevel};

use playground_common::{EngineConfig, PlaygroundError};

/// Thread-safe WebAssembly engine wrapper.
///
/// This struct wraps a Wasmtime [`Engine`] configured to compile and run
/// large compiler modules. The engine holds no per-invocation state.
///
/// # Configuration
///
/// The engine is configured with:
/// - **Async Support**: guest execution is driven as a future
/// - **Cranelift**: speed-optimized code unless disabled
/// - **No fuel or epoch interruption**: compiler runs are not time-limited
///
/// # Example
///
/// ```ignore
/// use playground_common::EngineConfig;
/// use playground_core::WasmEngine;
///
/// let config = EngineConfig::default();
/// let engine = WasmEngine::new(&config)?;
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Engine,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The Wasmtime configuration is invalid
    /// - The on-disk compilation cache cannot be configured
    pub fn new(config: &EngineConfig) -> Result<Self, PlaygroundError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.async_support(true);

        wasmtime_config.cranelift_opt_level(if config.optimize {
            OptLevel::Speed
        } else {
            OptLevel::None
        });

        wasmtime_config.parallel_compilation(config.parallel_compilation);

        if config.cache_compiled_modules {
            wasmtime_config.cache_config_load_default().map_err(|e| {
                PlaygroundError::invalid_config(format!("Failed to load cache config: {e}"))
            })?;
            debug!("On-disk compilation cache enabled");
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            PlaygroundError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(
            optimize = config.optimize,
            cache = config.cache_compiled_modules,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine,
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("optimize", &self.config.optimize)
            .field("cache_compiled_modules", &self.config.cache_compiled_modules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation_default() {
        let config = EngineConfig::default();
        let engine = WasmEngine::new(&config);

        assert!(engine.is_ok());
        assert!(engine.unwrap().config().optimize);
    }

    #[test]
    fn test_engine_creation_unoptimized() {
        let config = EngineConfig {
            optimize: false,
            parallel_compilation: false,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();
        assert!(!engine.config().optimize);
    }

    #[test]
    fn test_engine_debug() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();

        let debug_str = format!("{engine:?}");
        assert!(debug_str.contains("WasmEngine"));
        assert!(debug_str.contains("optimize"));
    }
}
