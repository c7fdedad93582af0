//! Typed procedures on top of [`RpcPeer`].
//!
//! The execution side exposes `compile` and `init`; the interactive side
//! exposes `ready`. Arguments travel as positional JSON values:
//!
//! | method    | args                               | result             |
//! |-----------|------------------------------------|--------------------|
//! | `compile` | `[command, files, source]`         | `CompileOutcome`   |
//! | `init`    | `[source]`                         | `null`             |
//! | `ready`   | `[]`                               | `null`             |

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::peer::{RpcHandler, RpcPeer};
use playground_common::{BridgeError, CompileOutcome, CompileRequest, FileSet, ModuleSource};

/// Method names.
pub mod methods {
    /// Run one compile. Served by the execution side.
    pub const COMPILE: &str = "compile";
    /// Pre-warm the module cache. Served by the execution side.
    pub const INIT: &str = "init";
    /// Liveness notification. Served by the interactive side.
    pub const READY: &str = "ready";
}

/// Interactive-side handle for the execution side's procedures.
#[derive(Debug, Clone)]
pub struct CompilerClient {
    peer: Arc<RpcPeer>,
}

impl CompilerClient {
    /// Wrap a connected peer.
    pub fn new(peer: Arc<RpcPeer>) -> Self {
        Self { peer }
    }

    /// Run `request` on the execution side.
    ///
    /// Module and execution failures come back inside the outcome; only
    /// bridge failures are errors.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the call could not be completed.
    pub async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome, BridgeError> {
        let args = compile_args(request)?;
        let result = self.peer.call(methods::COMPILE, args).await?;
        serde_json::from_value(result).map_err(|e| BridgeError::codec(e.to_string()))
    }

    /// Resolve `source` into the execution side's module cache.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Remote`] if resolution failed, or another
    /// [`BridgeError`] if the call could not be completed.
    pub async fn init(&self, source: &ModuleSource) -> Result<(), BridgeError> {
        let arg = serde_json::to_value(source).map_err(|e| BridgeError::codec(e.to_string()))?;
        self.peer.call(methods::INIT, vec![arg]).await?;
        Ok(())
    }

    /// The underlying peer.
    pub fn peer(&self) -> &Arc<RpcPeer> {
        &self.peer
    }
}

/// Encode a request as `compile` arguments.
///
/// # Errors
///
/// Returns [`BridgeError::Codec`] if a part cannot be serialized.
pub fn compile_args(request: &CompileRequest) -> Result<Vec<Value>, BridgeError> {
    let codec = |e: serde_json::Error| BridgeError::codec(e.to_string());

    Ok(vec![
        Value::String(request.command.clone()),
        serde_json::to_value(&request.files).map_err(codec)?,
        serde_json::to_value(&request.source).map_err(codec)?,
    ])
}

/// Decode `compile` arguments.
///
/// # Errors
///
/// Returns [`BridgeError::Codec`] if an argument is missing or mistyped.
pub fn parse_compile_args(args: Vec<Value>) -> Result<CompileRequest, BridgeError> {
    let mut args = args.into_iter();
    let command: String = next_arg(&mut args, "command")?;
    let files: FileSet = next_arg(&mut args, "files")?;
    let source: ModuleSource = next_arg(&mut args, "source")?;

    Ok(CompileRequest::new(command, files, source))
}

/// Decode `init` arguments.
///
/// # Errors
///
/// Returns [`BridgeError::Codec`] if the source is missing or mistyped.
pub fn parse_init_args(args: Vec<Value>) -> Result<ModuleSource, BridgeError> {
    next_arg(&mut args.into_iter(), "source")
}

fn next_arg<T: DeserializeOwned>(
    args: &mut impl Iterator<Item = Value>,
    name: &str,
) -> Result<T, BridgeError> {
    let value = args
        .next()
        .ok_or_else(|| BridgeError::codec(format!("missing argument '{name}'")))?;
    serde_json::from_value(value).map_err(|e| BridgeError::codec(format!("argument '{name}': {e}")))
}

/// Interactive-side handler whose only procedure is `ready`.
///
/// The first `ready` call releases the paired [`ReadyWaiter`]; later calls
/// are acknowledged and ignored.
pub struct ReadySignal {
    tx: Mutex<Option<oneshot::Sender<()>>>,
}

/// Resolves once the execution side has announced itself.
#[derive(Debug)]
pub struct ReadyWaiter {
    rx: oneshot::Receiver<()>,
}

impl ReadySignal {
    /// Create a handler and the waiter it releases.
    pub fn new() -> (Arc<Self>, ReadyWaiter) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            ReadyWaiter { rx },
        )
    }
}

#[async_trait]
impl RpcHandler for ReadySignal {
    async fn handle(&self, method: &str, _args: Vec<Value>) -> Result<Value, String> {
        if method != methods::READY {
            return Err(format!("unknown method '{method}'"));
        }

        match self.tx.lock().take() {
            Some(tx) => {
                info!("Execution context ready");
                let _ = tx.send(());
            }
            None => debug!("Repeated ready ignored"),
        }
        Ok(Value::Null)
    }
}

impl ReadyWaiter {
    /// Wait for the first `ready`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Closed`] if the handler was dropped first.
    pub async fn wait(self) -> Result<(), BridgeError> {
        self.rx.await.map_err(|_| BridgeError::Closed)
    }
}
