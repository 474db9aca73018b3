//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! HarnessConfig (built in code, or embedded in a host's serde config)
//!     → validation.rs (semantic checks)
//!     → HarnessConfig (validated, immutable)
//!     → Listener::new / EnvelopeHandler::new / init_logging
//! ```
//!
//! # Design Decisions
//! - Config is immutable once handed to a component
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod schema;
pub mod validation;

pub use schema::EnvelopeConfig;
pub use schema::HarnessConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use validation::{validate_config, ValidationError};
