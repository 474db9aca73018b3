//! In-process connection broker.
//!
//! # Data Flow
//! ```text
//! Dialer::dial_context
//!     → dial.rs (race: context / listener close / rendezvous)
//!     → listener.rs (waiting accept call's ticket is fulfilled)
//!     → connection.rs (PipeConn pair, one per side)
//!     → Hand off to HTTP layer
//!
//! Listener States:
//!     Open → Closed
//! ```
//!
//! # Design Decisions
//! - Single-slot synchronous handoff, no accept backlog
//! - No sockets: endpoints are `tokio::io::duplex` halves
//! - Dial network and address are ignored

pub mod connection;
pub mod dial;
pub mod listener;

pub use connection::{ConnectionId, IpcAddr, PipeConn};
pub use dial::{CancelHandle, CancelReason, DialContext, Dialer};
pub use listener::{listen, Listener, ListenerError};
