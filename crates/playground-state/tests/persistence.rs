//! Debounced persistence and hydration across a restart.
//!
//! Runs on a paused clock so debounce periods elapse instantly and
//! deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use playground_state::codec;
use playground_state::defaults::default_state;
use playground_state::{
    FileStorage, HydrationSource, LocalStorage, Location, MemoryLocation, MemoryStorage,
    Persister, STORAGE_KEY, StateStore, hydrate,
};

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Memory storage that counts writes.
#[derive(Default)]
struct CountingStorage {
    inner: MemoryStorage,
    writes: AtomicUsize,
}

impl CountingStorage {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl LocalStorage for CountingStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }
}

struct Harness {
    store: StateStore,
    location: Arc<MemoryLocation>,
    storage: Arc<CountingStorage>,
    persister: Persister,
}

fn harness() -> Harness {
    let store = StateStore::new(default_state("tsc", "latest"));
    let location = Arc::new(MemoryLocation::default());
    let storage = Arc::new(CountingStorage::default());
    let persister = Persister::spawn(
        &store,
        Arc::clone(&location) as Arc<dyn Location>,
        Arc::clone(&storage) as Arc<dyn LocalStorage>,
        DEBOUNCE,
    );
    Harness {
        store,
        location,
        storage,
        persister,
    }
}

/// Let spawned tasks and blocking storage writes run.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// Test: Debounce
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_is_one_write() {
    let h = harness();
    settle().await;
    assert_eq!(h.storage.writes(), 1);

    for i in 0..5 {
        h.store.edit("main.ts", format!("let x = {i}")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(h.storage.writes(), 1);

    tokio::time::sleep(DEBOUNCE).await;
    settle().await;
    assert_eq!(h.storage.writes(), 2);

    let stored = h.storage.get(STORAGE_KEY).unwrap();
    assert_eq!(h.location.fragment().as_deref(), Some(stored.as_str()));
    assert_eq!(codec::decode(&stored).unwrap(), h.store.playground_state());
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_encoding_is_not_written() {
    let h = harness();
    settle().await;

    h.store.add("util.ts", "").unwrap();
    h.store.select("main.ts").unwrap();
    tokio::time::sleep(DEBOUNCE * 2).await;
    settle().await;
    assert_eq!(h.storage.writes(), 2);

    h.store.select("util.ts").unwrap();
    h.store.update_output(|output| output.elapsed_millis = 12.0);
    h.store.set_command("tsc --noEmit");
    h.store.set_command("tsc");
    tokio::time::sleep(DEBOUNCE * 2).await;
    settle().await;
    assert_eq!(h.storage.writes(), 2);
}

// ============================================================================
// Test: Starting State
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_state_from_storage_reaches_fragment_without_edits() {
    let defaults = default_state("tsc", "latest");
    let mut saved = defaults.clone();
    saved.command = "tsc --saved".into();

    let location = Arc::new(MemoryLocation::default());
    let storage = Arc::new(CountingStorage::default());
    storage.set(STORAGE_KEY, &codec::encode(&saved).unwrap()).unwrap();

    let hydrated = hydrate(location.as_ref(), storage.as_ref(), &defaults);
    assert_eq!(hydrated.source, HydrationSource::Storage);

    let store = StateStore::new(hydrated.state);
    let persister = Persister::spawn(
        &store,
        Arc::clone(&location) as Arc<dyn Location>,
        Arc::clone(&storage) as Arc<dyn LocalStorage>,
        DEBOUNCE,
    );
    tokio::time::sleep(DEBOUNCE * 3).await;
    settle().await;

    let stored = storage.get(STORAGE_KEY).unwrap();
    assert_eq!(location.fragment().as_deref(), Some(stored.as_str()));
    assert_eq!(codec::decode(&stored).unwrap(), saved);

    drop(store);
    persister.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_shared_link_overwrites_stale_storage() {
    let defaults = default_state("tsc", "latest");
    let mut stale = defaults.clone();
    stale.command = "tsc --stale".into();
    let mut shared = defaults.clone();
    shared.version = "2025.4.5".into();
    let link = codec::encode(&shared).unwrap();

    let location = Arc::new(MemoryLocation::new(Some(&link)));
    let storage = Arc::new(CountingStorage::default());
    storage.set(STORAGE_KEY, &codec::encode(&stale).unwrap()).unwrap();

    let store = StateStore::new(hydrate(location.as_ref(), storage.as_ref(), &defaults).state);
    let persister = Persister::spawn(
        &store,
        Arc::clone(&location) as Arc<dyn Location>,
        Arc::clone(&storage) as Arc<dyn LocalStorage>,
        DEBOUNCE,
    );
    drop(store);
    persister.finish().await;

    assert_eq!(storage.get(STORAGE_KEY), Some(link.clone()));
    assert_eq!(location.fragment(), Some(link));
}

#[tokio::test(start_paused = true)]
async fn test_sinks_already_in_sync_are_not_rewritten() {
    let state = default_state("tsc", "latest");
    let encoded = codec::encode(&state).unwrap();
    let location = Arc::new(MemoryLocation::new(Some(&encoded)));
    let storage = Arc::new(CountingStorage::default());
    storage.set(STORAGE_KEY, &encoded).unwrap();

    let store = StateStore::new(state);
    let persister = Persister::spawn(
        &store,
        Arc::clone(&location) as Arc<dyn Location>,
        Arc::clone(&storage) as Arc<dyn LocalStorage>,
        DEBOUNCE,
    );
    drop(store);
    persister.finish().await;

    assert_eq!(storage.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pending_change_flushed_when_store_dropped() {
    let h = harness();
    settle().await;

    h.store.set_version("2025.1.2");
    let expected = h.store.playground_state();

    let mut finish = tokio_test::task::spawn(h.persister.finish());
    tokio_test::assert_pending!(finish.poll());
    drop(h.store);
    finish.await;

    let stored = h.storage.get(STORAGE_KEY).unwrap();
    assert_eq!(codec::decode(&stored).unwrap(), expected);
}

// ============================================================================
// Test: Restart
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_file_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let defaults = default_state("tsc", "latest");

    {
        let store = StateStore::new(defaults.clone());
        let persister = Persister::spawn(
            &store,
            Arc::new(MemoryLocation::default()),
            Arc::new(FileStorage::new(&path)),
            DEBOUNCE,
        );
        store.rename("main.ts", "index.ts").unwrap();
        store.set_command("tsc -p .");
        drop(store);
        persister.finish().await;
    }

    let hydrated = hydrate(&MemoryLocation::default(), &FileStorage::new(&path), &defaults);
    assert_eq!(hydrated.source, HydrationSource::Storage);
    assert_eq!(hydrated.state.files.paths(), ["index.ts", "tsconfig.json"]);
    assert_eq!(hydrated.state.command, "tsc -p .");

    let store = StateStore::new(hydrated.state);
    assert_eq!(store.snapshot().active, "index.ts");
}

#[tokio::test]
async fn test_shared_link_wins_over_storage() {
    let storage = MemoryStorage::default();
    let mut mine = default_state("tsc", "latest");
    mine.command = "tsc --mine".into();
    storage.set(STORAGE_KEY, &codec::encode(&mine).unwrap()).unwrap();

    let mut theirs = default_state("tsc", "2025.2.3");
    theirs.command = "tsc --theirs".into();
    let link = format!("#{}", codec::encode(&theirs).unwrap());

    let hydrated = hydrate(
        &MemoryLocation::new(Some(&link)),
        &storage,
        &default_state("tsc", "latest"),
    );
    assert_eq!(hydrated.source, HydrationSource::Url);
    assert_eq!(hydrated.state, theirs);
}
