//! Execution-side core of the compile playground.
//!
//! This crate provides what the execution context needs to run a compiler
//! module against a set of files:
//! - [`WasmEngine`]: Configured Wasmtime engine
//! - [`CompiledModule`]: Compiled compiler module for one version
//! - [`ModuleCache`]: Version to module resolution with coalesced misses
//! - [`VirtualFs`]: Per-invocation filesystem and captured streams
//! - [`ProcessInvoker`]: Single-flight one-shot execution
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (One per worker, shared by cache and invoker)          │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ModuleCache                          │
//! │  - Fetch (direct URL or registry tarball)               │
//! │  - Compile once per version, never evicted              │
//! │  - Concurrent misses await one shared resolution        │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │        ProcessInvoker + Store<WorkerContext>            │
//! │  (Per-invocation, one at a time)                        │
//! │  - VirtualFs mounted at /app                            │
//! │  - stdout / stderr captured in memory                   │
//! │  - Exit code delivered over a one-shot channel          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod archive;
pub mod cache;
pub mod engine;
pub mod invoker;
pub mod module;
pub mod store;
pub mod vfs;

pub use cache::{CacheStats, ModuleCache, ModuleFetcher};
pub use engine::WasmEngine;
pub use invoker::{ExecutionOutcome, ProcessInvoker, tokenize};
pub use module::CompiledModule;
pub use store::WorkerContext;
pub use vfs::{StreamSink, VirtualFs};
