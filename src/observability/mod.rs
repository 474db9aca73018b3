//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: connection_id, encoding, status)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, filtered)
//!     → whatever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - The crate never installs a subscriber or recorder implicitly
//! - Metrics go through the `metrics` facade and are free when no
//!   recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
