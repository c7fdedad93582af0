//! The execution side's RPC procedures.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::CompileWorker;
use playground_rpc::api::{parse_compile_args, parse_init_args};
use playground_rpc::{RpcHandler, methods};

/// Serves `compile` and `init` from a [`CompileWorker`].
#[derive(Debug, Clone)]
pub struct WorkerService {
    worker: Arc<CompileWorker>,
}

impl WorkerService {
    /// Serve `worker`.
    pub fn new(worker: Arc<CompileWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl RpcHandler for WorkerService {
    async fn handle(&self, method: &str, args: Vec<Value>) -> Result<Value, String> {
        debug!(method, "Handling call");

        match method {
            methods::COMPILE => {
                let request = parse_compile_args(args).map_err(|e| e.to_string())?;
                let outcome = self.worker.compile(request).await;
                serde_json::to_value(&outcome).map_err(|e| e.to_string())
            }
            methods::INIT => {
                let source = parse_init_args(args).map_err(|e| e.to_string())?;
                self.worker.init(&source).await.map_err(|e| e.to_string())?;
                Ok(Value::Null)
            }
            other => Err(format!("unknown method '{other}'")),
        }
    }
}
