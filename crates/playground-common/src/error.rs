//! Error types for the playground.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`ModuleError`]: Resolving a compiler version to an executable module
//! - [`StageError`]: Building or reading back the per-invocation filesystem
//! - [`InvokeError`]: Running a module as a one-shot process
//! - [`BridgeError`]: Malformed, unmatched or undeliverable RPC envelopes
//! - [`HydrationError`]: Persisted or shared state that cannot be decoded
//! - [`StateError`]: Rejected mutations of the editable session state
//! - [`PlaygroundError`]: Top-level error wrapping all of the above
//!
//! A non-zero exit code from the compiler is deliberately absent here: it is a
//! normal outcome carried by [`crate::CompileResult`], not a fault.

use std::io;

use thiserror::Error;

use crate::types::FailureKind;

/// Errors resolving a version (or manifest) to a compiled module.
///
/// All variants are terminal for the invocation that hit them, but never
/// poison the module cache: a later request for the same version retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// The module or archive bytes could not be retrieved.
    #[error("Failed to fetch {url}: {reason}")]
    Fetch {
        /// The URL that was requested.
        url: String,
        /// Description of the transport or status failure.
        reason: String,
    },

    /// The archive could not be unpacked or lacks the expected module entry.
    #[error("Failed to unpack {archive}: {reason}")]
    Unpack {
        /// Location of the archive.
        archive: String,
        /// Description of the unpack failure.
        reason: String,
    },

    /// The bytes are not a valid WebAssembly module.
    #[error("Module compilation failed: {reason}")]
    Compile {
        /// Description of the compilation failure.
        reason: String,
    },
}

impl ModuleError {
    /// Create a new `Fetch` error.
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Unpack` error.
    pub fn unpack(archive: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unpack {
            archive: archive.into(),
            reason: reason.into(),
        }
    }

    /// Create an `Unpack` error for an archive lacking the expected entry.
    pub fn missing_entry(archive: impl Into<String>, filename: &str) -> Self {
        Self::unpack(archive, format!("no entry named '{filename}'"))
    }

    /// Create a new `Compile` error.
    pub fn compile(reason: impl Into<String>) -> Self {
        Self::Compile {
            reason: reason.into(),
        }
    }

    /// The failure category reported to the interactive side.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch { .. } => FailureKind::Fetch,
            Self::Unpack { .. } => FailureKind::Unpack,
            Self::Compile { .. } => FailureKind::Compile,
        }
    }
}

/// Errors staging files into, or extracting files from, the virtual filesystem.
#[derive(Error, Debug)]
pub enum StageError {
    /// A file path escapes the mount point or is otherwise unusable.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path as supplied.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The backing store could not be written or read.
    #[error("Filesystem error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    /// Create a new `InvalidPath` error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors running a module instance.
///
/// A guest that exits with a non-zero code is not an error; these variants
/// cover failures to get the guest running (or to hear back from it) at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The command line could not be split into words.
    #[error("Invalid command line: {command}")]
    InvalidCommand {
        /// The command as typed.
        command: String,
    },

    /// The module could not be linked or instantiated.
    #[error("Instantiation failed: {reason}")]
    Instantiate {
        /// Description of the failure.
        reason: String,
    },

    /// The module does not export the expected entry point.
    #[error("Entry point '{name}' not found")]
    EntryPointMissing {
        /// The export that was looked up.
        name: String,
    },

    /// The guest task ended without delivering an exit signal.
    #[error("Execution aborted before an exit code was reported")]
    Aborted,
}

impl InvokeError {
    /// Create a new `Instantiate` error.
    pub fn instantiate(reason: impl Into<String>) -> Self {
        Self::Instantiate {
            reason: reason.into(),
        }
    }

    /// The failure category reported to the interactive side.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidCommand { .. } => FailureKind::InvalidCommand,
            Self::Instantiate { .. } | Self::EntryPointMissing { .. } | Self::Aborted => {
                FailureKind::Instantiate
            }
        }
    }
}

/// Errors on the RPC bridge.
///
/// Each one is fatal to a single call only; the bridge keeps serving others.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The transport is closed; no response will ever arrive.
    #[error("RPC channel closed")]
    Closed,

    /// An envelope could not be parsed.
    #[error("Malformed envelope: {reason}")]
    Malformed {
        /// Parser diagnostic.
        reason: String,
    },

    /// A response arrived for an id with no pending call.
    #[error("Unmatched response id {id}")]
    Unmatched {
        /// The correlation id carried by the response.
        id: u64,
    },

    /// The remote procedure reported a failure.
    #[error("Remote call '{method}' failed: {message}")]
    Remote {
        /// The method that was called.
        method: String,
        /// The remote error message.
        message: String,
    },

    /// Arguments or results could not be converted to or from JSON.
    #[error("Payload codec error: {reason}")]
    Codec {
        /// Serde diagnostic.
        reason: String,
    },
}

impl BridgeError {
    /// Create a new `Malformed` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Create a new `Codec` error.
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }
}

/// Errors decoding persisted or shared session state.
///
/// These never reach the user: hydration falls through to the next source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HydrationError {
    /// Nothing was stored at the source.
    #[error("No state present")]
    Absent,

    /// The text is not valid base64.
    #[error("Invalid encoding: {reason}")]
    Encoding { reason: String },

    /// The decoded bytes are not a valid compressed stream.
    #[error("Invalid compressed payload: {reason}")]
    Inflate { reason: String },

    /// The decompressed payload is not a valid state record.
    #[error("Invalid state record: {reason}")]
    Parse { reason: String },
}

/// Rejected mutations of the session state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The last remaining file cannot be removed.
    #[error("Cannot remove the last remaining file")]
    LastFile,

    /// Another file already uses the path.
    #[error("A file named '{path}' already exists")]
    DuplicatePath { path: String },

    /// No file has the path.
    #[error("No file named '{path}'")]
    UnknownPath { path: String },

    /// The path is empty or blank.
    #[error("Invalid file name '{path}'")]
    InvalidPath { path: String },
}

/// Top-level playground errors.
#[derive(Error, Debug)]
pub enum PlaygroundError {
    /// Module resolution failed.
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// Staging failed.
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Invocation failed.
    #[error("Invoke error: {0}")]
    Invoke(#[from] InvokeError),

    /// The bridge failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A state mutation was rejected.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl PlaygroundError {
    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error comes from obtaining the compiler module
    /// rather than from running it.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Module(_) | Self::Invoke(_) | Self::Bridge(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModuleError::fetch("https://cdn/x.wasm", "status 404");
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://cdn/x.wasm: status 404"
        );

        let err = ModuleError::missing_entry("pkg.tgz", "tsgo.wasm");
        assert_eq!(
            err.to_string(),
            "Failed to unpack pkg.tgz: no entry named 'tsgo.wasm'"
        );

        assert_eq!(
            StateError::LastFile.to_string(),
            "Cannot remove the last remaining file"
        );
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(ModuleError::fetch("u", "r").kind(), FailureKind::Fetch);
        assert_eq!(ModuleError::unpack("a", "r").kind(), FailureKind::Unpack);
        assert_eq!(ModuleError::compile("r").kind(), FailureKind::Compile);
        assert_eq!(
            InvokeError::InvalidCommand {
                command: "tsc '".into()
            }
            .kind(),
            FailureKind::InvalidCommand
        );
        assert_eq!(InvokeError::Aborted.kind(), FailureKind::Instantiate);
    }

    #[test]
    fn test_error_from_module() {
        let err: PlaygroundError = ModuleError::compile("bad magic").into();
        assert!(matches!(err, PlaygroundError::Module(_)));
        assert!(err.is_infrastructure());

        let err: PlaygroundError = StateError::LastFile.into();
        assert!(!err.is_infrastructure());
    }
}
