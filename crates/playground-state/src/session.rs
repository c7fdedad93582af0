//! One compile cycle, from the session to the output pane.
//!
//! ```text
//! Idle ─► Requested ─► InFlight ─┬─► Succeeded ─┐
//!                                └─► Failed ────┴─► Idle
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::store::{CompilePhase, OutputState, StateStore};
use playground_common::{CompileOutcome, CompileRequest, ModuleSource};
use playground_rpc::CompilerClient;

/// Drives compiles of the session in a [`StateStore`].
///
/// Requests made while one is in flight queue behind it on the execution
/// side; nothing is cancelled.
#[derive(Debug, Clone)]
pub struct Playground {
    store: Arc<StateStore>,
    client: CompilerClient,
}

impl Playground {
    /// Compile `store`'s session through `client`.
    pub fn new(store: Arc<StateStore>, client: CompilerClient) -> Self {
        Self { store, client }
    }

    /// The session being compiled.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Compile the current files with the session's command and version.
    pub async fn compile(&self) -> CompilePhase {
        let version = self.store.snapshot().version;
        self.compile_from(ModuleSource::from(version)).await
    }

    /// Compile the current files against an explicit module source.
    ///
    /// Publishes the outcome to the output pane, returns the store to
    /// [`CompilePhase::Idle`] and reports the terminal phase.
    pub async fn compile_from(&self, source: ModuleSource) -> CompilePhase {
        let session = self.store.snapshot();
        set_phase(&self.store, CompilePhase::Requested);

        let request = CompileRequest::new(session.command, session.files, source);
        let key = request_key(&request);
        set_phase(&self.store, CompilePhase::InFlight);
        info!(
            request = %key,
            version = request.source.version(),
            files = request.files.len(),
            "Compile requested"
        );

        let start = Instant::now();
        let output = match self.client.compile(&request).await {
            Ok(CompileOutcome::Completed(result)) => {
                let elapsed_millis = result.elapsed_millis;
                let (phase, error) = if result.is_success() {
                    (CompilePhase::Succeeded, None)
                } else {
                    (CompilePhase::Failed, Some(result.diagnostics()))
                };
                info!(request = %key, exit_code = result.exit_code, "Compile finished");
                OutputState {
                    phase,
                    result: Some(result),
                    error,
                    elapsed_millis,
                }
            }
            Ok(CompileOutcome::Failed {
                kind,
                message,
                elapsed_millis,
            }) => {
                warn!(request = %key, %kind, %message, "Compiler unavailable");
                OutputState {
                    phase: CompilePhase::Failed,
                    result: None,
                    error: Some(format!("Compiler unavailable ({kind}): {message}")),
                    elapsed_millis,
                }
            }
            Err(e) => {
                warn!(request = %key, error = %e, "Compile request failed");
                OutputState {
                    phase: CompilePhase::Failed,
                    result: None,
                    error: Some(format!("Worker error: {e}")),
                    elapsed_millis: start.elapsed().as_secs_f64() * 1000.0,
                }
            }
        };

        let terminal = output.phase;
        self.store.set_output(output);
        set_phase(&self.store, CompilePhase::Idle);
        terminal
    }
}

fn set_phase(store: &StateStore, phase: CompilePhase) {
    store.update_output(|output| output.phase = phase);
}

/// Short stable digest of a request, for correlating log lines.
fn request_key(request: &CompileRequest) -> String {
    let mut hasher = DefaultHasher::new();
    request.command.hash(&mut hasher);
    for file in request.files.iter() {
        file.path.hash(&mut hasher);
        file.content.hash(&mut hasher);
    }
    request.source.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_state;
    use async_trait::async_trait;
    use playground_common::{CompileResult, FailureKind, OutputFiles};
    use playground_rpc::api::parse_compile_args;
    use playground_rpc::{RpcHandler, RpcPeer, channel, methods};
    use serde_json::Value;

    /// Answers compiles by echoing each file under `dist/`, failing when the
    /// command contains `--fail`.
    struct EchoCompiler;

    #[async_trait]
    impl RpcHandler for EchoCompiler {
        async fn handle(&self, method: &str, args: Vec<Value>) -> Result<Value, String> {
            assert_eq!(method, methods::COMPILE);
            let request = parse_compile_args(args).map_err(|e| e.to_string())?;
            let outcome = if request.source.version() == "missing" {
                CompileOutcome::Failed {
                    kind: FailureKind::Fetch,
                    message: "HTTP status 404 Not Found".into(),
                    elapsed_millis: 3.0,
                }
            } else if request.command.contains("--fail") {
                CompileOutcome::Completed(CompileResult {
                    output_files: OutputFiles::new(),
                    stdout: String::new(),
                    stderr: "error TS1005".into(),
                    exit_code: 2,
                    elapsed_millis: 5.0,
                })
            } else {
                CompileOutcome::Completed(CompileResult {
                    output_files: request
                        .files
                        .iter()
                        .map(|f| (format!("dist/{}", f.path), Some(f.content.clone())))
                        .collect(),
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: 0,
                    elapsed_millis: 7.0,
                })
            };
            serde_json::to_value(outcome).map_err(|e| e.to_string())
        }
    }

    struct Nothing;

    #[async_trait]
    impl RpcHandler for Nothing {
        async fn handle(&self, method: &str, _args: Vec<Value>) -> Result<Value, String> {
            Err(format!("unknown method '{method}'"))
        }
    }

    fn playground() -> (Playground, RpcPeer) {
        let (left, right) = channel();
        let worker = RpcPeer::spawn(right, Arc::new(EchoCompiler));
        let client = CompilerClient::new(Arc::new(RpcPeer::spawn(left, Arc::new(Nothing))));
        let store = Arc::new(StateStore::new(default_state("tsc", "latest")));
        (Playground::new(store, client), worker)
    }

    #[tokio::test]
    async fn test_success_publishes_result() {
        let (playground, _worker) = playground();

        assert_eq!(playground.compile().await, CompilePhase::Succeeded);
        let output = playground.store().snapshot().output;
        assert_eq!(output.phase, CompilePhase::Idle);
        assert_eq!(output.error, None);
        assert!((output.elapsed_millis - 7.0).abs() < f64::EPSILON);
        let result = output.result.unwrap();
        assert_eq!(
            result.output_files["dist/main.ts"].as_deref(),
            Some("const x: number = 1")
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_shows_diagnostics() {
        let (playground, _worker) = playground();
        playground.store().set_command("tsc --fail");

        assert_eq!(playground.compile().await, CompilePhase::Failed);
        let output = playground.store().snapshot().output;
        assert_eq!(output.phase, CompilePhase::Idle);
        assert_eq!(output.error.as_deref(), Some("Exit code: 2\n\n\nerror TS1005"));
    }

    #[tokio::test]
    async fn test_infrastructure_failure() {
        let (playground, _worker) = playground();
        playground.store().set_version("missing");

        assert_eq!(playground.compile().await, CompilePhase::Failed);
        let output = playground.store().snapshot().output;
        assert_eq!(output.result, None);
        assert!(output.error.unwrap().contains("fetch"));
    }

    #[tokio::test]
    async fn test_bridge_failure() {
        let (playground, worker) = playground();
        drop(worker);

        assert_eq!(playground.compile().await, CompilePhase::Failed);
        let output = playground.store().snapshot().output;
        assert!(output.error.unwrap().starts_with("Worker error"));
    }

    #[tokio::test]
    async fn test_phases_observed_in_order() {
        let (playground, _worker) = playground();
        let mut changes = playground.store().subscribe();

        let observer = tokio::spawn(async move {
            let mut seen = vec![];
            while changes.changed().await.is_ok() {
                let phase = changes.borrow_and_update().output.phase;
                if seen.last() != Some(&phase) {
                    seen.push(phase);
                }
                if phase == CompilePhase::Idle {
                    break;
                }
            }
            seen
        });

        playground.compile().await;
        let seen = observer.await.unwrap();
        // Requested and InFlight are published back to back, so an observer
        // only wakes for the latter.
        assert_eq!(seen, [CompilePhase::InFlight, CompilePhase::Idle]);
    }

    #[test]
    fn test_request_key_is_stable() {
        let state = default_state("tsc", "latest");
        let a = CompileRequest::new("tsc", state.files.clone(), "latest");
        let b = CompileRequest::new("tsc", state.files.clone(), "latest");
        let c = CompileRequest::new("tsc --noEmit", state.files, "latest");

        assert_eq!(request_key(&a), request_key(&b));
        assert_ne!(request_key(&a), request_key(&c));
        assert_eq!(request_key(&a).len(), 16);
    }
}
