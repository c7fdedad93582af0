//! Running the execution context on its own thread.
//!
//! The worker gets a dedicated OS thread and tokio runtime, so a long guest
//! run never stalls the interactive side. It talks to the rest of the
//! process only through its [`Port`].

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::runtime::Builder;
use tracing::{info, warn};

use crate::{CompileWorker, WorkerService};
use playground_common::{ModuleSource, PlaygroundError, RuntimeConfig};
use playground_core::ModuleFetcher;
use playground_rpc::{CompilerClient, Port, ReadySignal, ReadyWaiter, RpcPeer, channel, methods};

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Returns `true` once the worker has stopped.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker to stop. It stops once the other end of its port
    /// is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread panicked.
    pub fn join(self) -> Result<(), PlaygroundError> {
        self.thread
            .join()
            .map_err(|_| PlaygroundError::Io(io::Error::other("worker thread panicked")))
    }
}

/// Start a worker for `config` serving `port`.
///
/// # Errors
///
/// Returns an error if the engine, the runtime or the thread cannot be
/// created.
pub fn spawn_worker(
    config: &RuntimeConfig,
    port: Port,
    fetcher: Arc<dyn ModuleFetcher>,
) -> Result<WorkerHandle, PlaygroundError> {
    let worker = CompileWorker::new(config, fetcher)?;
    spawn_with(worker, port, config.artifact.prewarm.clone())
}

/// Start an already-built worker serving `port`.
///
/// When `prewarm` names a version it is resolved before `ready` is sent; a
/// failure there is logged and left for the first compile to report.
///
/// # Errors
///
/// Returns an error if the runtime or the thread cannot be created.
pub fn spawn_with(
    worker: CompileWorker,
    port: Port,
    prewarm: Option<String>,
) -> Result<WorkerHandle, PlaygroundError> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("playground-exec")
        .enable_all()
        .build()?;

    let thread = thread::Builder::new()
        .name("playground-worker".into())
        .spawn(move || runtime.block_on(serve(Arc::new(worker), port, prewarm)))?;

    Ok(WorkerHandle { thread })
}

async fn serve(worker: Arc<CompileWorker>, port: Port, prewarm: Option<String>) {
    let peer = RpcPeer::spawn(port, Arc::new(WorkerService::new(Arc::clone(&worker))));

    if let Some(version) = prewarm {
        info!(version = %version, "Pre-warming module cache");
        if let Err(e) = worker.init(&ModuleSource::from(version)).await {
            warn!(error = %e, "Pre-warm failed");
        }
    }

    if let Err(e) = peer.call(methods::READY, vec![]).await {
        warn!(error = %e, "Ready notification not delivered");
    }

    info!("Worker serving");
    peer.closed().await;
    info!("Worker stopped");
}

/// Start a worker and connect an interactive-side client to it.
///
/// Must be called within a tokio runtime, which serves the client's end.
///
/// # Errors
///
/// Returns an error if the worker cannot be started.
pub fn launch(
    config: &RuntimeConfig,
    fetcher: Arc<dyn ModuleFetcher>,
) -> Result<(CompilerClient, ReadyWaiter, WorkerHandle), PlaygroundError> {
    let (interactive, execution) = channel();
    let handle = spawn_worker(config, execution, fetcher)?;

    let (signal, ready) = ReadySignal::new();
    let client = CompilerClient::new(Arc::new(RpcPeer::spawn(interactive, signal)));

    Ok((client, ready, handle))
}
