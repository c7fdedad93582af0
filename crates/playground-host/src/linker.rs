//! Host function registration for Wasmtime linkers.
//!
//! The compiler module is a WASI preview1 command: it reads its sources and
//! writes its outputs through the preopened mount point, and reports
//! termination through `proc_exit`.

use tracing::debug;
use wasmtime::Linker;
use wasmtime_wasi::preview1;

use playground_common::PlaygroundError;
use playground_core::WorkerContext;

/// Register all host functions a compiler module may import.
///
/// # Errors
///
/// Returns an error if registration fails.
pub fn register_all(linker: &mut Linker<WorkerContext>) -> Result<(), PlaygroundError> {
    register_wasi(linker)?;
    Ok(())
}

/// Register the `wasi_snapshot_preview1` imports.
///
/// # Errors
///
/// Returns an error if an import is already defined on the linker.
pub fn register_wasi(linker: &mut Linker<WorkerContext>) -> Result<(), PlaygroundError> {
    preview1::add_to_linker_async(linker, WorkerContext::wasi_mut).map_err(|e| {
        PlaygroundError::invalid_config(format!("Failed to register WASI preview1: {e}"))
    })?;

    debug!("WASI preview1 registered");
    Ok(())
}
