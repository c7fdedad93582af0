//! Common types, errors, and configuration for the compile playground.
//!
//! This crate provides shared functionality used across the workspace:
//! - The data model exchanged between the interactive and execution sides
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for runtime and persistence settings

pub mod config;
pub mod config_file;
pub mod error;
pub mod types;

pub use config::{ArtifactConfig, EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, PersistenceConfig, SessionDefaults};
pub use error::{
    BridgeError, HydrationError, InvokeError, ModuleError, PlaygroundError, StageError,
    StateError,
};
pub use types::{
    CompileOutcome, CompileRequest, CompileResult, FailureKind, FileId, FileSet, ModuleSource,
    OutputFiles, PackageManifest, PlaygroundState, STDERR_PATH, STDOUT_PATH, SourceFile,
};
