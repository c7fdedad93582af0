//! Interactive side of the compile playground.
//!
//! This crate owns everything the user edits and everything that outlives a
//! single run:
//! - [`StateStore`]: Observable session state and its mutations
//! - [`codec`]: The compressed share/persist encoding
//! - [`hydrate()`]: Startup state from URL, storage or defaults
//! - [`Persister`]: Debounced write-back to URL and storage
//! - [`Playground`]: One compile cycle over the bridge
//! - [`versions`]: Nightly compiler version identifiers

pub mod codec;
pub mod defaults;
pub mod hydrate;
pub mod persist;
pub mod session;
pub mod store;
pub mod versions;

pub use hydrate::{HydrationSource, Hydrated, hydrate};
pub use persist::{
    FileStorage, LocalStorage, Location, MemoryLocation, MemoryStorage, Persister, STORAGE_KEY,
};
pub use session::Playground;
pub use store::{CompilePhase, OutputState, Session, StateStore};
