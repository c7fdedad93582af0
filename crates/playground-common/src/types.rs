//! Data model shared by the interactive and execution sides.
//!
//! Everything here crosses the RPC bridge or the persistence layer, so every
//! type is a plain, fully owned, serializable value.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved output path carrying captured standard output on failure.
pub const STDOUT_PATH: &str = "/dev/stdout";

/// Reserved output path carrying captured standard error on failure.
pub const STDERR_PATH: &str = "/dev/stderr";

/// Extracted files keyed by path relative to the extraction root.
///
/// `None` marks an entry that exists without content (an empty directory),
/// as opposed to `Some(String::new())` for an empty file.
pub type OutputFiles = BTreeMap<String, Option<String>>;

/// Identity of one [`SourceFile`].
///
/// A fresh id is minted whenever a file is created or renamed, so anything
/// bound to the old identity can tell it has been invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(Uuid);

impl FileId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single editable file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    id: FileId,
    /// Path relative to the project root, e.g. `main.ts`.
    pub path: String,
    /// File contents.
    pub content: String,
}

impl SourceFile {
    /// Create a file with a new identity.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: FileId::new(),
            path: path.into(),
            content: content.into(),
        }
    }

    /// The identity of this file.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Build a renamed copy with a new identity, leaving `self` untouched.
    pub fn renamed(&self, path: impl Into<String>) -> Self {
        Self::new(path, self.content.clone())
    }
}

/// Ordered mapping of path to content.
///
/// Keys are unique. Insertion order is kept for display only; it has no
/// meaning to the compiler. Serializes as `[[path, content], ...]`.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<SourceFile>,
}

impl FileSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(path, content)` pairs.
    ///
    /// A repeated path keeps its first position and its last content.
    pub fn from_pairs<P, C>(pairs: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        let mut set = Self::new();
        for (path, content) in pairs {
            set.insert(path, content);
        }
        set
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if there are no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns `true` if a file has this path.
    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    /// Index of the file with this path.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.files.iter().position(|f| f.path == path)
    }

    /// Look up a file by path.
    pub fn get(&self, path: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Look up a file by identity.
    pub fn get_by_id(&self, id: FileId) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Content of the file with this path.
    pub fn content(&self, path: &str) -> Option<&str> {
        self.get(path).map(|f| f.content.as_str())
    }

    /// Insert a new file or overwrite the content of an existing one.
    ///
    /// Returns `true` if the path was not present before. Overwriting keeps
    /// the file's identity.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> bool {
        let path = path.into();
        let content = content.into();
        if let Some(existing) = self.files.iter_mut().find(|f| f.path == path) {
            existing.content = content;
            false
        } else {
            self.files.push(SourceFile::new(path, content));
            true
        }
    }

    /// Remove a file, returning it.
    pub fn remove(&mut self, path: &str) -> Option<SourceFile> {
        let index = self.position(path)?;
        Some(self.files.remove(index))
    }

    /// Put `file` at `index`, returning the file it displaced.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn replace_at(&mut self, index: usize, file: SourceFile) -> SourceFile {
        std::mem::replace(&mut self.files[index], file)
    }

    /// Mutable access to the content of a file.
    pub fn content_mut(&mut self, path: &str) -> Option<&mut String> {
        self.files
            .iter_mut()
            .find(|f| f.path == path)
            .map(|f| &mut f.content)
    }

    /// Iterate over files in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }

    /// Paths in insertion order.
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Flatten into `(path, content)` pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.files
            .iter()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect()
    }
}

/// Two sets are equal when they hold the same paths with the same contents
/// in the same order; identities are not compared.
impl PartialEq for FileSet {
    fn eq(&self, other: &Self) -> bool {
        self.files.len() == other.files.len()
            && self
                .files
                .iter()
                .zip(&other.files)
                .all(|(a, b)| a.path == b.path && a.content == b.content)
    }
}

impl Eq for FileSet {}

impl Serialize for FileSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.files.len()))?;
        for file in &self.files {
            seq.serialize_element(&(&file.path, &file.content))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for FileSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<(String, String)>::deserialize(deserializer)?;
        Ok(Self::from_pairs(pairs))
    }
}

/// A package-registry record naming a tarball that contains the module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Version the tarball belongs to; used as the cache key.
    pub version: String,
    /// URL of the gzip-compressed tarball.
    pub tarball: String,
}

#[derive(Deserialize)]
struct RegistryDocument {
    version: String,
    dist: RegistryDist,
}

#[derive(Deserialize)]
struct RegistryDist {
    tarball: String,
}

impl PackageManifest {
    /// Parse a registry version document (`{"version", "dist": {"tarball"}}`).
    pub fn from_registry_document(json: &str) -> Result<Self, serde_json::Error> {
        let doc: RegistryDocument = serde_json::from_str(json)?;
        Ok(Self {
            version: doc.version,
            tarball: doc.dist.tarball,
        })
    }
}

/// Where the bytes of a compiler module come from.
///
/// Serializes as a plain version string or as a manifest object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleSource {
    /// A versioned artifact at a conventional URL.
    DirectUrl(String),
    /// A module packed inside a registry tarball.
    Manifest(PackageManifest),
}

impl ModuleSource {
    /// The version this source resolves to; the module cache key.
    pub fn version(&self) -> &str {
        match self {
            Self::DirectUrl(version) => version,
            Self::Manifest(manifest) => &manifest.version,
        }
    }
}

impl From<&str> for ModuleSource {
    fn from(version: &str) -> Self {
        Self::DirectUrl(version.to_string())
    }
}

impl From<String> for ModuleSource {
    fn from(version: String) -> Self {
        Self::DirectUrl(version)
    }
}

/// One compile invocation's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Command line typed by the user, e.g. `tsc --noEmit`.
    pub command: String,
    /// Files to stage.
    pub files: FileSet,
    /// Compiler version or manifest.
    pub source: ModuleSource,
}

impl CompileRequest {
    /// Create a new request.
    pub fn new(command: impl Into<String>, files: FileSet, source: impl Into<ModuleSource>) -> Self {
        Self {
            command: command.into(),
            files,
            source: source.into(),
        }
    }
}

/// A finished invocation: the module ran and reported an exit code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    /// Produced files on success; captured streams under
    /// [`STDOUT_PATH`] / [`STDERR_PATH`] on failure.
    pub output_files: OutputFiles,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code reported by the module.
    pub exit_code: i32,
    /// Wall time from instantiation to exit, in milliseconds.
    pub elapsed_millis: f64,
}

impl CompileResult {
    /// Returns `true` if the module exited with code zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Diagnostic text shown in place of output for a failed compile.
    pub fn diagnostics(&self) -> String {
        format!(
            "Exit code: {}\n{}\n\n{}",
            self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Category of an infrastructure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Unpack,
    Compile,
    Stage,
    InvalidCommand,
    Instantiate,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Unpack => "unpack",
            Self::Compile => "compile",
            Self::Stage => "stage",
            Self::InvalidCommand => "invalid_command",
            Self::Instantiate => "instantiate",
        };
        f.write_str(name)
    }
}

/// The structured answer to a compile request.
///
/// `Completed` covers every run that produced an exit code, including
/// non-zero ones. `Failed` means the compiler never ran to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CompileOutcome {
    Completed(CompileResult),
    Failed {
        kind: FailureKind,
        message: String,
        #[serde(rename = "elapsedMillis")]
        elapsed_millis: f64,
    },
}

impl CompileOutcome {
    /// Time spent on the request, in milliseconds.
    pub fn elapsed_millis(&self) -> f64 {
        match self {
            Self::Completed(result) => result.elapsed_millis,
            Self::Failed { elapsed_millis, .. } => *elapsed_millis,
        }
    }
}

/// The persisted, shareable slice of the session.
///
/// Wire form: `{"f": [[path, content], ...], "c": command, "v": version}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaygroundState {
    #[serde(rename = "f")]
    pub files: FileSet,
    #[serde(rename = "c")]
    pub command: String,
    #[serde(rename = "v")]
    pub version: String,
}
