//! The execution context of the compile playground.
//!
//! This crate turns the core pieces into a service:
//! - [`CompileWorker`]: Resolve, stage, run and collect for one request
//! - [`WorkerService`]: The `compile` / `init` procedures on the bridge
//! - [`spawn_worker`]: The service on its own thread and runtime
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use playground_common::{CompileRequest, FileSet, RuntimeConfig};
//! use playground_host::HttpFetcher;
//! use playground_worker::launch;
//!
//! let (client, ready, _worker) = launch(&RuntimeConfig::default(), Arc::new(HttpFetcher::new()?))?;
//! ready.wait().await?;
//!
//! let files = FileSet::from_pairs([("main.ts", "const x: number = 1")]);
//! let outcome = client.compile(&CompileRequest::new("tsc", files, "latest")).await?;
//! ```

pub mod service;
pub mod spawn;
pub mod worker;

pub use service::WorkerService;
pub use spawn::{WorkerHandle, launch, spawn_with, spawn_worker};
pub use worker::CompileWorker;
