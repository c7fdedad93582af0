//! Compile playground CLI entry point.
//!
//! Runs one session of the playground from the terminal: hydrate the saved
//! or shared session, apply edits from the command line, compile once on the
//! worker thread and print what the compiler produced.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use playground_common::{CompileResult, ConfigFile, ModuleSource};
use playground_core::ModuleFetcher;
use playground_host::HttpFetcher;
use playground_state::defaults::default_state;
use playground_state::versions::{NIGHTLY_WINDOW, recent_versions, today_utc};
use playground_state::{
    CompilePhase, FileStorage, Location, LocalStorage, MemoryLocation, Persister, Playground,
    StateStore, codec, hydrate,
};
use playground_worker::launch;

#[derive(Debug, Parser)]
#[command(name = "playground", version, about = "Compile a small project with a versioned compiler module")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short, global = true, env = "PLAYGROUND_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile the session once and print the result.
    Compile {
        #[command(flatten)]
        session: SessionArgs,

        /// Resolve the version through the package registry.
        #[arg(long)]
        registry: bool,
    },

    /// Print the session's share fragment.
    Share {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// List recent nightly compiler versions.
    Versions {
        #[arg(long, default_value_t = NIGHTLY_WINDOW)]
        count: usize,
    },
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Share fragment to start from instead of the saved session.
    #[arg(long)]
    share: Option<String>,

    /// Add or replace a file, named after its file name.
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Compiler command line.
    #[arg(long)]
    command: Option<String>,

    /// Compiler version.
    #[arg(long)]
    version: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the results.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,playground=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    let config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    match cli.command {
        Command::Compile { session, registry } => compile(&config, session, registry).await,
        Command::Share { session } => share(&config, session).await,
        Command::Versions { count } => {
            for version in recent_versions(today_utc(), count) {
                println!("{version}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The hydrated session with command-line edits applied, and its persister.
struct Session {
    store: Arc<StateStore>,
    persister: Persister,
}

impl Session {
    async fn open(config: &ConfigFile, args: SessionArgs) -> anyhow::Result<Self> {
        let location = Arc::new(MemoryLocation::new(args.share.as_deref()));
        let storage = Arc::new(FileStorage::new(&config.persistence.storage_path));
        let defaults = default_state(
            &config.session.command,
            &config.runtime.artifact.default_version,
        );

        let hydrated = hydrate(location.as_ref(), storage.as_ref(), &defaults);
        info!(source = ?hydrated.source, "Session loaded");

        let store = Arc::new(StateStore::new(hydrated.state));
        let persister = Persister::spawn(
            &store,
            location as Arc<dyn Location>,
            storage as Arc<dyn LocalStorage>,
            config.persistence.debounce(),
        );

        for path in &args.files {
            apply_file(&store, path).await?;
        }
        if let Some(command) = args.command {
            store.set_command(command);
        }
        if let Some(version) = args.version {
            store.set_version(version);
        }

        Ok(Self { store, persister })
    }

    /// Flush pending writes and print the share fragment.
    async fn close(self) -> anyhow::Result<()> {
        let state = self.store.playground_state();
        drop(self.store);
        self.persister.finish().await;

        let fragment = codec::encode(&state).context("Failed to encode session")?;
        println!("#{fragment}");
        Ok(())
    }
}

async fn apply_file(store: &StateStore, path: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        bail!("{} has no usable file name", path.display());
    };

    if store.snapshot().files.contains(name) {
        store.edit(name, content)?;
    } else {
        store.add(name, content)?;
    }
    debug!(file = name, "Applied file from disk");
    Ok(())
}

async fn share(config: &ConfigFile, args: SessionArgs) -> anyhow::Result<ExitCode> {
    Session::open(config, args).await?.close().await?;
    Ok(ExitCode::SUCCESS)
}

async fn compile(
    config: &ConfigFile,
    args: SessionArgs,
    registry: bool,
) -> anyhow::Result<ExitCode> {
    let session = Session::open(config, args).await?;

    let fetcher = Arc::new(HttpFetcher::new()?);
    let (client, ready, worker) = launch(
        &config.runtime,
        Arc::clone(&fetcher) as Arc<dyn ModuleFetcher>,
    )?;
    ready.wait().await.context("Worker did not start")?;

    let version = session.store.snapshot().version;
    let source = if registry {
        ModuleSource::Manifest(
            fetcher
                .resolve_manifest(&config.runtime.artifact, &version)
                .await?,
        )
    } else {
        ModuleSource::from(version)
    };

    let playground = Playground::new(Arc::clone(&session.store), client);
    let phase = playground.compile_from(source).await;
    let output = session.store.snapshot().output;

    match (&output.result, &output.error) {
        (Some(result), None) => print_outputs(result),
        (_, Some(error)) => eprintln!("{error}"),
        (None, None) => {}
    }
    info!(elapsed_ms = output.elapsed_millis, "Compile cycle complete");

    drop(playground);
    tokio::task::spawn_blocking(move || worker.join())
        .await
        .context("Worker join task failed")??;
    session.close().await?;

    Ok(if phase == CompilePhase::Succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outputs(result: &CompileResult) {
    if result.output_files.is_empty() {
        println!("// no output files");
    }
    for (path, content) in &result.output_files {
        match content {
            Some(content) => println!("// {path}\n{content}"),
            None => println!("// {path}/"),
        }
    }
}
