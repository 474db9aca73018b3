//! In-process telemetry submission harness.
//!
//! Two parts work together:
//! - `net`: a listener/dialer pair handing out connected in-memory
//!   byte streams, with accept/dial semantics but no socket.
//! - `envelope`: an HTTP handler that validates telemetry submissions
//!   (raw JSON or base64 + zlib) and recovers the JSON payload.
//!
//! `http` runs an axum server on the listener with the handler, and a
//! hyper client through the dialer, so a protocol client can be exercised
//! end to end inside one process.

pub mod config;
pub mod envelope;
pub mod http;
pub mod net;
pub mod observability;

pub use config::HarnessConfig;
pub use envelope::{Envelope, EnvelopeHandler, HandlerConfig};
pub use http::{HarnessClient, HarnessServer};
pub use net::{listen, Dialer, Listener};
