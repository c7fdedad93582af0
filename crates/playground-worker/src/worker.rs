//! One compile, start to finish.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};

use playground_common::{
    CompileOutcome, CompileRequest, CompileResult, ExecutionConfig, FailureKind, ModuleError,
    ModuleSource, OutputFiles, PlaygroundError, RuntimeConfig, STDERR_PATH, STDOUT_PATH,
};
use playground_core::{ModuleCache, ModuleFetcher, ProcessInvoker, StreamSink, VirtualFs, WasmEngine};
use playground_host::{StreamLog, register_all};

/// Execution-side compile pipeline.
///
/// Holds the module cache and the invoker for the lifetime of the worker;
/// both are dropped, and the cache cleared, only when the worker stops.
pub struct CompileWorker {
    cache: Arc<ModuleCache>,
    invoker: Arc<ProcessInvoker>,
    execution: ExecutionConfig,
}

impl CompileWorker {
    /// Build the engine, cache and invoker for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created or the host
    /// functions cannot be registered.
    pub fn new(config: &RuntimeConfig, fetcher: Arc<dyn ModuleFetcher>) -> Result<Self, PlaygroundError> {
        let engine = WasmEngine::new(&config.engine)?;
        let cache = ModuleCache::new(engine.inner().clone(), fetcher, config.artifact.clone());

        let mut invoker = ProcessInvoker::new(engine.inner().clone(), config.execution.argv0.clone());
        register_all(invoker.linker_mut())?;

        info!(
            mount_point = %config.execution.mount_point,
            output_dir = %config.execution.output_dir,
            "Compile worker created"
        );

        Ok(Self::with_parts(Arc::new(cache), Arc::new(invoker), config.execution.clone()))
    }

    /// Assemble a worker from existing parts.
    pub fn with_parts(
        cache: Arc<ModuleCache>,
        invoker: Arc<ProcessInvoker>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            cache,
            invoker,
            execution,
        }
    }

    /// The module cache.
    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Resolve `source` ahead of the first compile.
    ///
    /// # Errors
    ///
    /// Returns the [`ModuleError`] that stopped resolution.
    pub async fn init(&self, source: &ModuleSource) -> Result<(), ModuleError> {
        self.cache.resolve(source).await?;
        Ok(())
    }

    /// Run one request.
    ///
    /// Never fails: infrastructure problems come back as
    /// [`CompileOutcome::Failed`] and every run that reached an exit code
    /// comes back as [`CompileOutcome::Completed`].
    #[instrument(skip(self, request), fields(version = request.source.version(), files = request.files.len()))]
    pub async fn compile(&self, request: CompileRequest) -> CompileOutcome {
        let start = Instant::now();

        let module = match self.cache.resolve(&request.source).await {
            Ok(module) => module,
            Err(e) => return failed(e.kind(), &e, start),
        };

        let argv = match self.invoker.argv(&request.command) {
            Ok(argv) => argv,
            Err(e) => return failed(e.kind(), &e, start),
        };

        let fs = match VirtualFs::stage(
            &request.files,
            &self.execution.mount_point,
            self.execution.stream_capacity(),
        ) {
            Ok(fs) => fs,
            Err(e) => return failed(FailureKind::Stage, &e, start),
        };

        let outcome = match self.invoker.run(&module, &argv, &fs).await {
            Ok(outcome) => outcome,
            Err(e) => return failed(e.kind(), &e, start),
        };

        let stdout = fs.read_stream(StreamSink::Stdout);
        let mut stderr = fs.read_stream(StreamSink::Stderr);
        if let Some(trap) = &outcome.trap {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(trap);
        }
        StreamLog::echo(&stdout, &stderr);

        let output_files = if outcome.is_success() {
            match fs.extract(&self.execution.output_dir) {
                Ok(files) => files,
                Err(e) => return failed(FailureKind::Stage, &e, start),
            }
        } else {
            stream_outputs(&stdout, &stderr)
        };

        info!(
            exit_code = outcome.exit_code,
            outputs = output_files.len(),
            elapsed_ms = outcome.elapsed_millis(),
            "Compile finished"
        );

        CompileOutcome::Completed(CompileResult {
            output_files,
            stdout,
            stderr,
            exit_code: outcome.exit_code,
            elapsed_millis: outcome.elapsed_millis(),
        })
    }
}

impl std::fmt::Debug for CompileWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileWorker")
            .field("cache", &self.cache)
            .field("invoker", &self.invoker)
            .finish_non_exhaustive()
    }
}

/// Captured streams under their reserved pseudo-paths.
fn stream_outputs(stdout: &str, stderr: &str) -> OutputFiles {
    OutputFiles::from([
        (STDOUT_PATH.to_string(), Some(stdout.to_string())),
        (STDERR_PATH.to_string(), Some(stderr.to_string())),
    ])
}

fn failed(kind: FailureKind, error: &dyn std::error::Error, start: Instant) -> CompileOutcome {
    match kind {
        FailureKind::Fetch | FailureKind::Unpack | FailureKind::Compile => {
            error!(%kind, error = %error, "Compiler module unavailable");
        }
        _ => warn!(%kind, error = %error, "Compile could not run"),
    }

    CompileOutcome::Failed {
        kind,
        message: error.to_string(),
        elapsed_millis: start.elapsed().as_secs_f64() * 1000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_outputs() {
        let outputs = stream_outputs("", "error TS2322\n");
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["/dev/stdout"].as_deref(), Some(""));
        assert_eq!(outputs["/dev/stderr"].as_deref(), Some("error TS2322\n"));
    }

    #[test]
    fn test_failed_carries_kind_and_message() {
        let err = ModuleError::fetch("https://cdn/x.wasm", "HTTP status 404 Not Found");
        let outcome = failed(err.kind(), &err, Instant::now());

        match outcome {
            CompileOutcome::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::Fetch);
                assert!(message.contains("404"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
