//! HTTP composition layer.
//!
//! # Data Flow
//! ```text
//! HarnessClient
//!     → Dialer (in-process connection)
//!     → server.rs (axum::serve on the Listener)
//!     → EnvelopeHandler
//!     → response back over the same connection
//! ```

pub mod client;
pub mod server;

pub use client::{ClientError, HarnessClient};
pub use server::HarnessServer;
