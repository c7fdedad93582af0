//! One-shot process execution.
//!
//! [`ProcessInvoker`] runs a compiled module exactly once against a staged
//! [`VirtualFs`]:
//!
//! 1. Wait for the single-flight gate (FIFO, so runs complete in the order
//!    they were admitted)
//! 2. Instantiate the module with a fresh store bound to the filesystem
//! 3. Run `_start` on a spawned task that reports its exit status through a
//!    one-shot channel
//! 4. Report the exit code and the wall time since instantiation began

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, oneshot};
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use wasmtime::{Engine, Linker, Module, Store};
use wasmtime_wasi::I32Exit;

use crate::CompiledModule;
use crate::store::{WorkerContext, build_wasi, create_store};
use crate::vfs::VirtualFs;
use playground_common::InvokeError;

/// Export invoked to start the guest.
pub const ENTRY_POINT: &str = "_start";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Exit code reported by the guest; 1 if it trapped.
    pub exit_code: i32,

    /// Time from instantiation start to termination.
    pub elapsed: Duration,

    /// Trap message if the guest terminated abnormally.
    pub trap: Option<String>,
}

impl ExecutionOutcome {
    /// Returns `true` if the guest exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Elapsed time in fractional milliseconds.
    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Exit status sent once by the guest task.
struct GuestExit {
    code: i32,
    trap: Option<String>,
}

/// Runs modules one at a time.
///
/// Host functions are registered through [`ProcessInvoker::linker_mut`]
/// before the first run.
pub struct ProcessInvoker {
    engine: Engine,
    linker: Arc<Linker<WorkerContext>>,
    gate: Arc<Mutex<()>>,
    argv0: String,
    next_id: AtomicU64,
}

impl ProcessInvoker {
    /// Create an invoker whose argument vectors start with `argv0`.
    pub fn new(engine: Engine, argv0: impl Into<String>) -> Self {
        let linker = Linker::new(&engine);

        Self {
            engine,
            linker: Arc::new(linker),
            gate: Arc::new(Mutex::new(())),
            argv0: argv0.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get a mutable reference to the linker.
    ///
    /// Only meaningful during setup; once a run is in flight the linker is
    /// shared and a private copy would be made.
    pub fn linker_mut(&mut self) -> &mut Linker<WorkerContext> {
        Arc::make_mut(&mut self.linker)
    }

    /// Build the argument vector for a command line.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::InvalidCommand`] if the quoting is unbalanced.
    pub fn argv(&self, command: &str) -> Result<Vec<String>, InvokeError> {
        let mut argv = vec![self.argv0.clone()];
        argv.extend(tokenize(command)?);
        Ok(argv)
    }

    /// Run `module` once with `argv` against `fs`.
    ///
    /// Waits behind any run already in flight. The gate is held by the guest
    /// task itself, so a caller that gives up waiting does not let the next
    /// run overlap the abandoned one.
    ///
    /// # Errors
    ///
    /// Returns an [`InvokeError`] if the guest could not be started or its
    /// task ended without reporting an exit status. A non-zero exit code is
    /// a normal outcome, not an error.
    #[instrument(skip(self, module, fs), fields(version = module.version()))]
    pub async fn run(
        &self,
        module: &CompiledModule,
        argv: &[String],
        fs: &VirtualFs,
    ) -> Result<ExecutionOutcome, InvokeError> {
        let turn = Arc::clone(&self.gate).lock_owned().await;
        let invocation_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let wasi = build_wasi(fs, argv)?;
        let mut store = create_store(&self.engine, WorkerContext::new(invocation_id, wasi));
        let linker = Arc::clone(&self.linker);
        let module = module.inner().clone();
        let (exit_tx, exit_rx) = oneshot::channel();

        debug!(invocation_id, "Starting guest");
        let start = Instant::now();

        tokio::spawn(
            async move {
                let status = run_guest(&linker, &module, &mut store).await;
                // The caller may have stopped listening.
                let _ = exit_tx.send(status);
                drop(turn);
            }
            .instrument(info_span!("guest", invocation_id)),
        );

        let status = exit_rx.await.map_err(|_| InvokeError::Aborted)??;
        let elapsed = start.elapsed();

        if let Some(trap) = &status.trap {
            warn!(invocation_id, trap = %trap, "Guest trapped");
        }
        info!(
            invocation_id,
            exit_code = status.code,
            duration_ms = elapsed.as_millis(),
            "Guest exited"
        );

        Ok(ExecutionOutcome {
            exit_code: status.code,
            elapsed,
            trap: status.trap,
        })
    }
}

impl std::fmt::Debug for ProcessInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessInvoker")
            .field("argv0", &self.argv0)
            .finish_non_exhaustive()
    }
}

/// Split a command line into words using POSIX shell quoting rules.
///
/// # Errors
///
/// Returns [`InvokeError::InvalidCommand`] for unbalanced quotes or a
/// trailing escape.
pub fn tokenize(command: &str) -> Result<Vec<String>, InvokeError> {
    shlex::split(command).ok_or_else(|| InvokeError::InvalidCommand {
        command: command.to_string(),
    })
}

async fn run_guest(
    linker: &Linker<WorkerContext>,
    module: &Module,
    store: &mut Store<WorkerContext>,
) -> Result<GuestExit, InvokeError> {
    let instance = linker
        .instantiate_async(&mut *store, module)
        .await
        .map_err(|e| InvokeError::instantiate(format!("{e:#}")))?;

    let start = instance
        .get_typed_func::<(), ()>(&mut *store, ENTRY_POINT)
        .map_err(|_| InvokeError::EntryPointMissing {
            name: ENTRY_POINT.to_string(),
        })?;

    let status = match start.call_async(&mut *store, ()).await {
        Ok(()) => GuestExit {
            code: 0,
            trap: None,
        },
        Err(e) => match e.downcast_ref::<I32Exit>() {
            Some(exit) => GuestExit {
                code: exit.0,
                trap: None,
            },
            None => GuestExit {
                code: 1,
                trap: Some(format!("{e:#}")),
            },
        },
    };

    debug!(elapsed_ms = store.data().elapsed().as_millis(), "Guest finished");
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use playground_common::{EngineConfig, FileSet};

    fn files() -> FileSet {
        FileSet::from_pairs([("main.ts", "let x = 1")])
    }

    #[test]
    fn test_tokenize_plain_words() {
        assert_eq!(tokenize("tsc --noEmit").unwrap(), ["tsc", "--noEmit"]);
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_honors_quoting() {
        assert_eq!(
            tokenize(r#"tsc --outDir "out dir" 'a b'"#).unwrap(),
            ["tsc", "--outDir", "out dir", "a b"]
        );
        assert_eq!(tokenize(r"tsc a\ b").unwrap(), ["tsc", "a b"]);
    }

    #[test]
    fn test_tokenize_rejects_unbalanced_quotes() {
        let err = tokenize("tsc 'main.ts").unwrap_err();
        assert_eq!(
            err,
            InvokeError::InvalidCommand {
                command: "tsc 'main.ts".into()
            }
        );
    }

    #[test]
    fn test_argv_prefix() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let invoker = ProcessInvoker::new(engine.inner().clone(), "js");

        assert_eq!(invoker.argv("tsc -p .").unwrap(), ["js", "tsc", "-p", "."]);
    }

    #[test]
    fn test_outcome_helpers() {
        let outcome = ExecutionOutcome {
            exit_code: 0,
            elapsed: Duration::from_micros(1500),
            trap: None,
        };
        assert!(outcome.is_success());
        assert!((outcome.elapsed_millis() - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_return_from_start_is_exit_zero() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let invoker = ProcessInvoker::new(engine.inner().clone(), "js");
        let module = CompiledModule::from_wat(
            engine.inner(),
            "v1",
            r#"(module (func (export "_start")))"#,
        )
        .unwrap();
        let fs = VirtualFs::stage(&files(), "/app", 1024).unwrap();

        let outcome = invoker.run(&module, &["js".into()], &fs).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.trap, None);
    }

    #[tokio::test]
    async fn test_trap_is_exit_one() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let invoker = ProcessInvoker::new(engine.inner().clone(), "js");
        let module = CompiledModule::from_wat(
            engine.inner(),
            "v1",
            r#"(module (func (export "_start") unreachable))"#,
        )
        .unwrap();
        let fs = VirtualFs::stage(&files(), "/app", 1024).unwrap();

        let outcome = invoker.run(&module, &["js".into()], &fs).await.unwrap();
        assert_eq!(outcome.exit_code, 1);
        assert!(outcome.trap.is_some());
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let invoker = ProcessInvoker::new(engine.inner().clone(), "js");
        let module = CompiledModule::from_wat(engine.inner(), "v1", "(module)").unwrap();
        let fs = VirtualFs::stage(&files(), "/app", 1024).unwrap();

        let err = invoker.run(&module, &["js".into()], &fs).await.unwrap_err();
        assert!(matches!(err, InvokeError::EntryPointMissing { .. }));
    }

    #[tokio::test]
    async fn test_unresolved_import_fails_instantiation() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let invoker = ProcessInvoker::new(engine.inner().clone(), "js");
        let module = CompiledModule::from_wat(
            engine.inner(),
            "v1",
            r#"(module
                (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
                (func (export "_start")))"#,
        )
        .unwrap();
        let fs = VirtualFs::stage(&files(), "/app", 1024).unwrap();

        let err = invoker.run(&module, &["js".into()], &fs).await.unwrap_err();
        assert!(matches!(err, InvokeError::Instantiate { .. }));
    }
}
