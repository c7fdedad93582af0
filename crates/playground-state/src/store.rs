//! Observable session state.
//!
//! [`StateStore`] holds the one [`Session`] of the interactive side in a
//! `tokio::sync::watch` channel. Every accepted mutation notifies
//! subscribers; a rejected one leaves the session untouched and notifies
//! nobody.

use tokio::sync::watch;
use tracing::debug;

use crate::defaults::{DEFAULT_ACTIVE, default_files};
use playground_common::{CompileResult, FileId, FileSet, PlaygroundState, SourceFile, StateError};

/// Where the compile cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilePhase {
    #[default]
    Idle,
    Requested,
    InFlight,
    Succeeded,
    Failed,
}

/// What the output pane shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputState {
    pub phase: CompilePhase,

    /// Result of the last completed run, successful or not.
    pub result: Option<CompileResult>,

    /// Text shown in place of output when the last cycle failed.
    pub error: Option<String>,

    /// Duration of the last cycle.
    pub elapsed_millis: f64,
}

/// Everything the interactive side shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub files: FileSet,

    /// Path of the file open in the editor. Always names a file in `files`.
    pub active: String,

    pub command: String,
    pub version: String,
    pub output: OutputState,
}

impl Session {
    /// The persisted, shareable slice.
    pub fn playground_state(&self) -> PlaygroundState {
        PlaygroundState {
            files: self.files.clone(),
            command: self.command.clone(),
            version: self.version.clone(),
        }
    }

    /// The file open in the editor.
    pub fn active_file(&self) -> Option<&SourceFile> {
        self.files.get(&self.active)
    }
}

/// Owner of the session.
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<Session>,
}

impl StateStore {
    /// Start a session from `state`.
    ///
    /// An empty file set is replaced by the default files. The default entry
    /// file is selected if present, otherwise the first file.
    pub fn new(state: PlaygroundState) -> Self {
        let files = if state.files.is_empty() {
            default_files()
        } else {
            state.files
        };
        let active = if files.contains(DEFAULT_ACTIVE) {
            DEFAULT_ACTIVE.to_string()
        } else {
            files.paths().into_iter().next().unwrap_or_default()
        };

        let (tx, _) = watch::channel(Session {
            files,
            active,
            command: state.command,
            version: state.version,
            output: OutputState::default(),
        });
        Self { tx }
    }

    /// A copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// The current persisted slice.
    pub fn playground_state(&self) -> PlaygroundState {
        self.tx.borrow().playground_state()
    }

    /// Receive every later change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Replace the content of `path`.
    pub fn edit(&self, path: &str, content: impl Into<String>) -> Result<(), StateError> {
        let content = content.into();
        self.mutate(|session| {
            let slot = session
                .files
                .content_mut(path)
                .ok_or_else(|| StateError::UnknownPath {
                    path: path.to_string(),
                })?;
            *slot = content;
            Ok(())
        })
    }

    /// Rename `from` to `to`, returning the identity of the renamed file.
    ///
    /// The renamed file is created first, swapped into the old file's slot,
    /// and only then is the old file disposed of, so the set never lacks a
    /// file at that position. Renaming to the same path is a no-op.
    pub fn rename(&self, from: &str, to: &str) -> Result<FileId, StateError> {
        let to = validate_path(to)?;
        self.mutate(|session| {
            let (index, current) = session
                .files
                .iter()
                .enumerate()
                .find(|(_, f)| f.path == from)
                .map(|(i, f)| (i, f.clone()))
                .ok_or_else(|| StateError::UnknownPath {
                    path: from.to_string(),
                })?;
            if from == to {
                return Ok(current.id());
            }
            if session.files.contains(&to) {
                return Err(StateError::DuplicatePath { path: to });
            }

            let created = current.renamed(to.clone());
            let id = created.id();
            let disposed = session.files.replace_at(index, created);
            if session.active == from {
                session.active = to;
            }
            debug!(from, disposed = %disposed.id(), renamed = %id, "File renamed");
            Ok(id)
        })
    }

    /// Add a file and open it.
    pub fn add(&self, path: &str, content: impl Into<String>) -> Result<FileId, StateError> {
        let path = validate_path(path)?;
        let content = content.into();
        self.mutate(|session| {
            if session.files.contains(&path) {
                return Err(StateError::DuplicatePath { path });
            }
            session.files.insert(path.clone(), content);
            let id = session
                .files
                .get(&path)
                .map(SourceFile::id)
                .ok_or_else(|| StateError::UnknownPath { path: path.clone() })?;
            session.active = path;
            Ok(id)
        })
    }

    /// Remove `path`. If it was open, its neighbour is opened instead.
    pub fn remove(&self, path: &str) -> Result<(), StateError> {
        self.mutate(|session| {
            let index = session
                .files
                .position(path)
                .ok_or_else(|| StateError::UnknownPath {
                    path: path.to_string(),
                })?;
            if session.files.len() == 1 {
                return Err(StateError::LastFile);
            }

            session.files.remove(path);
            if session.active == path {
                let neighbour = index.min(session.files.len() - 1);
                session.active = session.files.paths().swap_remove(neighbour);
            }
            Ok(())
        })
    }

    /// Open `path` in the editor.
    pub fn select(&self, path: &str) -> Result<(), StateError> {
        self.mutate(|session| {
            if !session.files.contains(path) {
                return Err(StateError::UnknownPath {
                    path: path.to_string(),
                });
            }
            session.active = path.to_string();
            Ok(())
        })
    }

    /// Replace the command line.
    pub fn set_command(&self, command: impl Into<String>) {
        let command = command.into();
        self.tx.send_if_modified(|session| {
            let changed = session.command != command;
            session.command = command;
            changed
        });
    }

    /// Replace the compiler version.
    pub fn set_version(&self, version: impl Into<String>) {
        let version = version.into();
        self.tx.send_if_modified(|session| {
            let changed = session.version != version;
            session.version = version;
            changed
        });
    }

    /// Replace the output pane.
    pub fn set_output(&self, output: OutputState) {
        self.tx.send_if_modified(|session| {
            let changed = session.output != output;
            session.output = output;
            changed
        });
    }

    /// Update the output pane in place.
    pub fn update_output(&self, update: impl FnOnce(&mut OutputState)) {
        self.tx.send_modify(|session| update(&mut session.output));
    }

    /// Apply `op`, notifying subscribers only if it succeeds.
    ///
    /// `op` must validate before it changes anything.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Session) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut outcome = None;
        self.tx.send_if_modified(|session| {
            let result = op(session);
            let changed = result.is_ok();
            outcome = Some(result);
            changed
        });
        match outcome {
            Some(result) => result,
            None => unreachable!("send_if_modified always runs its closure"),
        }
    }
}

/// Trimmed path, rejected if blank.
fn validate_path(path: &str) -> Result<String, StateError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(StateError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(trimmed.to_string())
}
