//! RPC bridge between the interactive context and the execution context.
//!
//! The two contexts share no memory. Every call crosses the bridge as a
//! serialized [`Envelope`] over an ordered, reliable [`Port`]:
//!
//! ```text
//!   interactive                               execution
//!  ┌────────────┐   call {id, compile, ..}   ┌────────────┐
//!  │  RpcPeer   │ ─────────────────────────▶ │  RpcPeer   │
//!  │            │ ◀───────────────────────── │            │
//!  │ ReadySignal│   reply/fault {id, ..}     │WorkerService│
//!  └────────────┘                            └────────────┘
//! ```
//!
//! Each side is both caller and callee. Responses are matched to pending
//! calls by id; an envelope that cannot be parsed or matched is dropped and
//! affects no other call.

pub mod api;
pub mod envelope;
pub mod peer;
pub mod transport;

pub use api::{CompilerClient, ReadySignal, ReadyWaiter, methods};
pub use envelope::Envelope;
pub use peer::{RpcHandler, RpcPeer};
pub use transport::{Port, channel};
