//! Host-side capabilities for the compile playground.
//!
//! Everything the execution context needs from the outside world lives here,
//! behind the seams `playground-core` defines:
//!
//! - [`linker`]: The WASI preview1 surface the compiler module imports
//! - [`fetch`]: Retrieval of module artifacts and registry documents
//! - [`logging`]: Echo of captured guest streams into `tracing`

pub mod fetch;
pub mod linker;
pub mod logging;

pub use fetch::HttpFetcher;
pub use linker::{register_all, register_wasi};
pub use logging::StreamLog;
