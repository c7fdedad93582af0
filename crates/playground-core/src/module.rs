//! Compiled compiler modules.
//!
//! [`CompiledModule`] wraps a Wasmtime [`Module`] together with the version it
//! was resolved for and a hash of the bytes it was compiled from. Modules are
//! compiled once per version and shared by every invocation afterwards.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, Module};

use playground_common::ModuleError;

/// A compiled WebAssembly module ready to be instantiated.
///
/// # Thread Safety
///
/// `CompiledModule` is cheap to clone and can be shared across threads; the
/// underlying Wasmtime module is reference counted.
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,

    /// Version the module was resolved for.
    version: String,

    /// Hash of the original Wasm bytes.
    content_hash: String,

    /// When this module was compiled.
    compiled_at: Instant,
}

impl CompiledModule {
    /// Compile a module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Compile`] if the bytes are not a valid module.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, version: &str, bytes: &[u8]) -> Result<Self, ModuleError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes)
            .map_err(|e| ModuleError::compile(format!("Core module compilation failed: {e}")))?;

        let content_hash = compute_hash(bytes);

        info!(
            version,
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Module compiled"
        );

        Ok(Self {
            module,
            version: version.to_string(),
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, version: &str, wat: &str) -> Result<Self, ModuleError> {
        let module = Module::new(engine, wat)
            .map_err(|e| ModuleError::compile(format!("WAT compilation failed: {e}")))?;

        Ok(Self {
            module,
            version: version.to_string(),
            content_hash: compute_hash(wat.as_bytes()),
            compiled_at: Instant::now(),
        })
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.module
    }

    /// Version this module was resolved for.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// When this module was compiled.
    pub(crate) fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), ModuleError> {
        if bytes.len() < 8 {
            return Err(ModuleError::compile("Invalid Wasm: file too small"));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(ModuleError::compile("Invalid Wasm: bad magic number"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("version", &self.version)
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
