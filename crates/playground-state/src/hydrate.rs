//! Choosing the state a session starts from.

use tracing::{debug, info};

use crate::codec;
use crate::persist::{LocalStorage, Location, STORAGE_KEY};
use playground_common::{HydrationError, PlaygroundState};

/// Where the starting state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    /// A shared link.
    Url,
    /// The previous visit.
    Storage,
    /// Nothing usable was found.
    Defaults,
}

/// The starting state and its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hydrated {
    pub state: PlaygroundState,
    pub source: HydrationSource,
}

/// Pick the starting state: the URL fragment wins over local storage, which
/// wins over `defaults`.
///
/// A source that is missing or fails to decode is skipped silently. A state
/// that decodes with no files gets the default files.
pub fn hydrate(
    location: &dyn Location,
    storage: &dyn LocalStorage,
    defaults: &PlaygroundState,
) -> Hydrated {
    let candidates = [
        (HydrationSource::Url, location.fragment()),
        (HydrationSource::Storage, storage.get(STORAGE_KEY)),
    ];

    for (source, text) in candidates {
        match text.ok_or(HydrationError::Absent).and_then(|t| codec::decode(&t)) {
            Ok(mut state) => {
                if state.files.is_empty() {
                    state.files = defaults.files.clone();
                }
                info!(?source, files = state.files.len(), "Session hydrated");
                return Hydrated { state, source };
            }
            Err(e) => debug!(?source, error = %e, "Skipping hydration source"),
        }
    }

    info!("Starting from defaults");
    Hydrated {
        state: defaults.clone(),
        source: HydrationSource::Defaults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_state;
    use crate::persist::{MemoryLocation, MemoryStorage};
    use playground_common::FileSet;

    fn shared(content: &str) -> PlaygroundState {
        PlaygroundState {
            files: FileSet::from_pairs([("a.ts", content)]),
            command: "tsc --noEmit".into(),
            version: "2025.1.2".into(),
        }
    }

    fn encoded(state: &PlaygroundState) -> String {
        codec::encode(state).unwrap()
    }

    #[test]
    fn test_url_wins_over_storage() {
        let location = MemoryLocation::new(Some(&encoded(&shared("from url"))));
        let storage = MemoryStorage::default();
        storage.set(STORAGE_KEY, &encoded(&shared("from storage"))).unwrap();

        let hydrated = hydrate(&location, &storage, &default_state("tsc", "latest"));
        assert_eq!(hydrated.source, HydrationSource::Url);
        assert_eq!(hydrated.state, shared("from url"));
    }

    #[test]
    fn test_corrupt_url_falls_back_to_storage() {
        let location = MemoryLocation::new(Some("#not-a-valid-state"));
        let storage = MemoryStorage::default();
        storage.set(STORAGE_KEY, &encoded(&shared("from storage"))).unwrap();

        let hydrated = hydrate(&location, &storage, &default_state("tsc", "latest"));
        assert_eq!(hydrated.source, HydrationSource::Storage);
        assert_eq!(hydrated.state, shared("from storage"));
    }

    #[test]
    fn test_nothing_usable_gives_defaults() {
        let location = MemoryLocation::new(Some("%%%"));
        let storage = MemoryStorage::default();
        storage.set(STORAGE_KEY, "garbage").unwrap();
        let defaults = default_state("tsc", "latest");

        let hydrated = hydrate(&location, &storage, &defaults);
        assert_eq!(hydrated.source, HydrationSource::Defaults);
        assert_eq!(hydrated.state, defaults);
    }

    #[test]
    fn test_empty_file_set_gets_default_files() {
        let empty = PlaygroundState {
            files: FileSet::new(),
            command: "tsc -b".into(),
            version: "2025.1.2".into(),
        };
        let location = MemoryLocation::new(Some(&encoded(&empty)));
        let defaults = default_state("tsc", "latest");

        let hydrated = hydrate(&location, &MemoryStorage::default(), &defaults);
        assert_eq!(hydrated.source, HydrationSource::Url);
        assert_eq!(hydrated.state.files, defaults.files);
        assert_eq!(hydrated.state.command, "tsc -b");
    }
}
