//! Per-invocation execution context and store creation.
//!
//! This module provides:
//! - [`WorkerContext`]: Per-invocation state accessible from host functions
//! - [`build_wasi`]: The guest's view of a staged [`VirtualFs`]
//! - [`create_store`]: A fresh Wasmtime store for one run

use std::time::{Duration, Instant};

use wasmtime::{Engine, Store};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

use crate::vfs::{StreamSink, VirtualFs};
use playground_common::InvokeError;

/// Per-invocation execution context.
///
/// Created for every run and dropped with its store once the guest has
/// terminated. Host functions reach it through [`wasmtime::Caller`].
pub struct WorkerContext {
    /// WASI preview1 context bound to the staged filesystem.
    wasi: WasiP1Ctx,

    /// Monotonic invocation number, for tracing.
    pub invocation_id: u64,

    start_time: Instant,
}

impl WorkerContext {
    /// Create a context around an already-built WASI context.
    pub fn new(invocation_id: u64, wasi: WasiP1Ctx) -> Self {
        Self {
            wasi,
            invocation_id,
            start_time: Instant::now(),
        }
    }

    /// WASI context, for linker registration.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Build the guest's system interface for one run.
///
/// The staged store is preopened read-write at its mount point, both
/// standard streams go to the handle's in-memory sinks and `PWD` names the
/// mount point. Standard input is empty.
///
/// # Errors
///
/// Returns [`InvokeError::Instantiate`] if the staged directory cannot be
/// preopened.
pub fn build_wasi(fs: &VirtualFs, argv: &[String]) -> Result<WasiP1Ctx, InvokeError> {
    let mut builder = WasiCtxBuilder::new();
    builder
        .args(argv)
        .env("PWD", fs.mount_point())
        .stdout(fs.sink(StreamSink::Stdout))
        .stderr(fs.sink(StreamSink::Stderr));
    builder
        .preopened_dir(
            fs.host_root(),
            fs.mount_point(),
            DirPerms::all(),
            FilePerms::all(),
        )
        .map_err(|e| InvokeError::instantiate(format!("Failed to preopen mount point: {e}")))?;

    Ok(builder.build_p1())
}

/// Create a new Wasmtime store owning `context`.
///
/// No fuel or epoch deadline is set: a run lasts until the guest exits.
pub fn create_store(engine: &Engine, context: WorkerContext) -> Store<WorkerContext> {
    Store::new(engine, context)
}
