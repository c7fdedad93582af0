//! Where session state lives between visits, and the task that keeps it
//! there.
//!
//! Two sinks receive the same encoded string: the shareable URL fragment
//! ([`Location`]) and local storage ([`LocalStorage`]) under
//! [`STORAGE_KEY`]. [`Persister`] writes both after edits settle.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec;
use crate::store::{Session, StateStore};

/// Local storage key holding the encoded session.
pub const STORAGE_KEY: &str = "playground-state";

/// The fragment part of the page address.
pub trait Location: Send + Sync {
    /// Current fragment without the leading `#`, if any.
    fn fragment(&self) -> Option<String>;

    /// Replace the fragment without adding a history entry.
    fn replace_fragment(&self, fragment: &str);
}

/// Durable key-value storage.
pub trait LocalStorage: Send + Sync {
    /// Value stored under `key`. Unreadable storage reads as empty.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

/// A fragment held in memory.
#[derive(Debug, Default)]
pub struct MemoryLocation {
    fragment: RwLock<Option<String>>,
}

impl MemoryLocation {
    /// Start at `fragment`; a leading `#` is dropped.
    pub fn new(fragment: Option<&str>) -> Self {
        let fragment = fragment
            .map(|f| f.strip_prefix('#').unwrap_or(f).to_string())
            .filter(|f| !f.is_empty());
        Self {
            fragment: RwLock::new(fragment),
        }
    }
}

impl Location for MemoryLocation {
    fn fragment(&self) -> Option<String> {
        self.fragment.read().clone()
    }

    fn replace_fragment(&self, fragment: &str) {
        *self.fragment.write() = Some(fragment.to_string());
    }
}

/// Storage held in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage kept as a JSON object in a file.
///
/// The file is rewritten whole on every `set`, through a sibling temporary
/// file so a crash never leaves it half-written.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Use the file at `path`; it is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> io::Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).map_err(io::Error::other),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e),
        }
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Storage unreadable");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        // A corrupt file is replaced rather than blocking every later write.
        let mut entries = self.load().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, serde_json::to_vec_pretty(&entries)?)?;
        std::fs::rename(&staging, &self.path)
    }
}

/// Background task mirroring the store into both sinks.
///
/// The starting state is written at once unless both sinks already hold it.
/// Later changes are debounced: a write happens once no edit has arrived for
/// the debounce period. A write is skipped when the encoding equals the last
/// one written, so selecting files or publishing output never touches
/// storage.
/// When the store is dropped any pending change is flushed and the task
/// ends.
#[derive(Debug)]
pub struct Persister {
    task: JoinHandle<()>,
}

impl Persister {
    /// Start mirroring `store`. Must be called within a tokio runtime.
    pub fn spawn(
        store: &StateStore,
        location: Arc<dyn Location>,
        storage: Arc<dyn LocalStorage>,
        debounce: Duration,
    ) -> Self {
        let changes = store.subscribe();
        let task = tokio::spawn(persist_loop(changes, location, storage, debounce));
        Self { task }
    }

    /// Wait for the task to end, which happens after the store is dropped.
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Persister task failed");
        }
    }
}

async fn persist_loop(
    mut changes: watch::Receiver<Session>,
    location: Arc<dyn Location>,
    storage: Arc<dyn LocalStorage>,
    debounce: Duration,
) {
    // Bring both sinks up to the starting state so they agree before any edit.
    let mut last = codec::encode(&changes.borrow_and_update().playground_state()).ok();
    if let Some(encoded) = &last {
        let in_sync = location.fragment().as_ref() == Some(encoded)
            && storage.get(STORAGE_KEY).as_ref() == Some(encoded);
        if !in_sync {
            write(encoded, location.as_ref(), &storage).await;
        }
    }

    while changes.changed().await.is_ok() {
        let mut closed = false;
        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        closed = true;
                        break;
                    }
                }
                () = tokio::time::sleep(debounce) => break,
            }
        }

        let state = changes.borrow_and_update().playground_state();
        match codec::encode(&state) {
            Ok(encoded) if last.as_ref() != Some(&encoded) => {
                write(&encoded, location.as_ref(), &storage).await;
                last = Some(encoded);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to encode session"),
        }

        if closed {
            break;
        }
    }

    debug!("Persister stopped");
}

async fn write(encoded: &str, location: &dyn Location, storage: &Arc<dyn LocalStorage>) {
    location.replace_fragment(encoded);

    let storage = Arc::clone(storage);
    let value = encoded.to_string();
    let stored = tokio::task::spawn_blocking(move || storage.set(STORAGE_KEY, &value)).await;
    match stored {
        Ok(Ok(())) => debug!(bytes = encoded.len(), "Session persisted"),
        Ok(Err(e)) => warn!(error = %e, "Failed to write local storage"),
        Err(e) => warn!(error = %e, "Storage write task failed"),
    }
}
