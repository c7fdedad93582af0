//! Bridge endpoint: issues calls, matches responses, serves incoming calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::envelope::Envelope;
use crate::transport::Port;
use playground_common::BridgeError;

/// Serves the procedures one side exposes.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Handle one call. An `Err` is sent back as a fault carrying the message.
    async fn handle(&self, method: &str, args: Vec<Value>) -> Result<Value, String>;
}

struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Value, BridgeError>>,
}

struct PeerInner {
    outbound: UnboundedSender<String>,
    pending: DashMap<u64, PendingCall>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// One end of the bridge.
///
/// Calls may be pipelined; each waits only for the response with its own
/// id. Dropping the peer stops serving and closes its side of the port.
pub struct RpcPeer {
    inner: Arc<PeerInner>,
    done: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl RpcPeer {
    /// Start serving `port` with `handler`. Must be called within a tokio
    /// runtime.
    pub fn spawn(port: Port, handler: Arc<dyn RpcHandler>) -> Self {
        let (outbound, inbound) = port.into_parts();
        let inner = Arc::new(PeerInner {
            outbound,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });
        let (done_tx, done) = watch::channel(false);

        let reader = tokio::spawn(read_loop(Arc::clone(&inner), inbound, handler, done_tx));

        Self {
            inner,
            done,
            reader,
        }
    }

    /// Call `method` on the other side and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Remote`] if the handler reported a failure
    /// - [`BridgeError::Closed`] if the transport closed before a response
    /// - [`BridgeError::Codec`] if the call could not be serialized
    #[instrument(skip(self, args), fields(id = tracing::field::Empty))]
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::Span::current().record("id", id);

        let text = Envelope::Call {
            id,
            method: method.to_string(),
            args,
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                tx,
            },
        );

        if self.inner.closed.load(Ordering::SeqCst) || self.inner.outbound.send(text).is_err() {
            self.inner.pending.remove(&id);
            return Err(BridgeError::Closed);
        }

        debug!("Call sent");
        rx.await.map_err(|_| BridgeError::Closed)?
    }

    /// Number of calls awaiting a response.
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }

    /// Wait until the incoming direction has closed.
    pub async fn closed(&self) {
        let mut done = self.done.clone();
        // An error means the reader is gone, which is closed as well.
        let _ = done.wait_for(|closed| *closed).await;
    }
}

impl Drop for RpcPeer {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for RpcPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcPeer")
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

async fn read_loop(
    inner: Arc<PeerInner>,
    mut inbound: UnboundedReceiver<String>,
    handler: Arc<dyn RpcHandler>,
    done: watch::Sender<bool>,
) {
    while let Some(text) = inbound.recv().await {
        let envelope = match Envelope::decode(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed envelope");
                continue;
            }
        };

        match envelope {
            Envelope::Call { id, method, args } => {
                tokio::spawn(serve(Arc::clone(&inner), Arc::clone(&handler), id, method, args));
            }
            Envelope::Reply { id, result } => settle(&inner, id, Ok(result)),
            Envelope::Fault { id, error } => settle(&inner, id, Err(error)),
        }
    }

    inner.closed.store(true, Ordering::SeqCst);
    let ids: Vec<u64> = inner.pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, call)) = inner.pending.remove(&id) {
            let _ = call.tx.send(Err(BridgeError::Closed));
        }
    }

    debug!("Bridge closed");
    let _ = done.send(true);
}

/// Answer one call. Every call gets a response, even if the handler panics.
async fn serve(
    inner: Arc<PeerInner>,
    handler: Arc<dyn RpcHandler>,
    id: u64,
    method: String,
    args: Vec<Value>,
) {
    debug!(id, %method, "Serving call");

    let handled = {
        let method = method.clone();
        tokio::spawn(async move { handler.handle(&method, args).await })
    };
    let response = match handled.await {
        Ok(Ok(result)) => Envelope::Reply { id, result },
        Ok(Err(error)) => Envelope::Fault { id, error },
        Err(e) => {
            warn!(id, %method, error = %e, "Handler failed");
            Envelope::Fault {
                id,
                error: format!("handler for '{method}' failed: {e}"),
            }
        }
    };

    let text = match response.encode() {
        Ok(text) => text,
        Err(e) => Envelope::Fault {
            id,
            error: e.to_string(),
        }
        .encode()
        .unwrap_or_default(),
    };

    if inner.outbound.send(text).is_err() {
        debug!(id, %method, "Caller gone before response");
    }
}

fn settle(inner: &PeerInner, id: u64, outcome: Result<Value, String>) {
    let Some((_, call)) = inner.pending.remove(&id) else {
        warn!(error = %BridgeError::Unmatched { id }, "Dropping response");
        return;
    };

    let outcome = outcome.map_err(|message| BridgeError::Remote {
        method: call.method,
        message,
    });
    // The caller may have abandoned the call.
    let _ = call.tx.send(outcome);
}
