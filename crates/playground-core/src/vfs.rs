//! Per-invocation virtual filesystem.
//!
//! A [`VirtualFs`] is a private directory tree that exists for exactly one
//! compile. The guest sees it at the mount point (`/app` by default); the
//! two standard streams are captured into in-memory sinks. Dropping the
//! handle deletes everything, so a failed run never leaks into the next one.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, instrument};
use wasmtime_wasi::pipe::MemoryOutputPipe;

use playground_common::{FileSet, OutputFiles, STDERR_PATH, STDOUT_PATH, StageError};

/// One of the two captured standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSink {
    Stdout,
    Stderr,
}

impl StreamSink {
    /// Reserved path naming this sink.
    pub fn path(self) -> &'static str {
        match self {
            Self::Stdout => STDOUT_PATH,
            Self::Stderr => STDERR_PATH,
        }
    }
}

/// Handle to a staged filesystem.
pub struct VirtualFs {
    root: TempDir,
    mount_point: String,
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

impl VirtualFs {
    /// Write every file of `files` into a fresh store mounted at `mount_point`.
    ///
    /// Each stream sink buffers at most `stream_capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidPath`] for paths that are empty, absolute,
    /// not normalized or climb out of the mount point, and [`StageError::Io`]
    /// if the store cannot be written.
    #[instrument(skip(files), fields(files = files.len()))]
    pub fn stage(
        files: &FileSet,
        mount_point: &str,
        stream_capacity: usize,
    ) -> Result<Self, StageError> {
        let root = tempfile::Builder::new()
            .prefix("playground-")
            .tempdir()
            .map_err(|e| StageError::io(mount_point, e))?;

        for file in files.iter() {
            let relative = relative_path(&file.path)?;
            if relative.as_os_str().is_empty() {
                return Err(StageError::invalid_path(&file.path, "empty path"));
            }
            let target = root.path().join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| StageError::io(&file.path, e))?;
            }
            fs::write(&target, &file.content).map_err(|e| StageError::io(&file.path, e))?;
        }

        debug!(root = %root.path().display(), mount_point, "Files staged");

        Ok(Self {
            root,
            mount_point: mount_point.to_string(),
            stdout: MemoryOutputPipe::new(stream_capacity),
            stderr: MemoryOutputPipe::new(stream_capacity),
        })
    }

    /// Guest path of the store root.
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Host directory backing the mount point.
    pub fn host_root(&self) -> &Path {
        self.root.path()
    }

    /// Writable handle to a stream sink, for wiring into the guest.
    pub fn sink(&self, sink: StreamSink) -> MemoryOutputPipe {
        match sink {
            StreamSink::Stdout => self.stdout.clone(),
            StreamSink::Stderr => self.stderr.clone(),
        }
    }

    /// Everything written to a sink so far, as text.
    ///
    /// A sink nobody wrote to reads as an empty string.
    pub fn read_stream(&self, sink: StreamSink) -> String {
        let pipe = match sink {
            StreamSink::Stdout => &self.stdout,
            StreamSink::Stderr => &self.stderr,
        };
        String::from_utf8_lossy(&pipe.contents()).into_owned()
    }

    /// Collect the subtree under `subtree` (relative to the mount point, or
    /// absolute under it), with paths relative to the subtree root.
    ///
    /// Regular files map to their content; empty directories map to `None`.
    /// A subtree that does not exist yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidPath`] for a subtree outside the mount
    /// point and [`StageError::Io`] if the store cannot be read.
    #[instrument(skip(self))]
    pub fn extract(&self, subtree: &str) -> Result<OutputFiles, StageError> {
        let subtree_path = Path::new(subtree);
        let under_mount = subtree_path
            .strip_prefix(&self.mount_point)
            .unwrap_or(subtree_path);
        let dir = self.root.path().join(host_relative(subtree, under_mount)?);

        let mut out = OutputFiles::new();
        if dir.is_dir() {
            walk(&dir, "", &mut out)?;
        }

        debug!(entries = out.len(), "Subtree extracted");
        Ok(out)
    }
}

impl std::fmt::Debug for VirtualFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFs")
            .field("mount_point", &self.mount_point)
            .field("root", &self.root.path())
            .finish_non_exhaustive()
    }
}

/// Validate a project path and turn it into a relative host path.
///
/// Project paths must already be normalized: `./a`, `a//b` and `a/` name the
/// same file as some other spelling and would come back from extraction
/// under a different key, so they are rejected.
fn relative_path(path: &str) -> Result<PathBuf, StageError> {
    if !path.is_empty() && path.split('/').any(|segment| segment.is_empty() || segment == ".") {
        return Err(StageError::invalid_path(path, "path is not normalized"));
    }
    host_relative(path, Path::new(path))
}

/// Turn `path` into a host path relative to the store root. `shown` names it
/// in errors.
fn host_relative(shown: &str, path: &Path) -> Result<PathBuf, StageError> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(StageError::invalid_path(shown, "parent directory reference"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StageError::invalid_path(shown, "outside the mount point"));
            }
        }
    }
    Ok(relative)
}

fn walk(dir: &Path, prefix: &str, out: &mut OutputFiles) -> Result<(), StageError> {
    let entries = fs::read_dir(dir).map_err(|e| StageError::io(dir.display().to_string(), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| StageError::io(dir.display().to_string(), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| StageError::io(path.display().to_string(), e))?;

        if file_type.is_dir() {
            let before = out.len();
            walk(&path, &key, out)?;
            if out.len() == before {
                out.insert(key, None);
            }
        } else if file_type.is_file() {
            let bytes = fs::read(&path).map_err(|e| StageError::io(&key, e))?;
            out.insert(key, Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
    }

    Ok(())
}
