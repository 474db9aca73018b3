//! Configuration schema definitions.
//!
//! All types derive Serde traits so a host application can embed them in
//! its own configuration.

use serde::{Deserialize, Serialize};

/// Largest envelope body accepted by default: 32 MiB.
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 32 * 1024 * 1024;

/// Root configuration for the harness.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    /// In-process listener settings.
    pub listener: ListenerConfig,

    /// Envelope decoding limits.
    pub envelope: EnvelopeConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bytes each direction of a connection buffers before writes wait for
    /// the peer to read.
    pub pipe_buffer_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            pipe_buffer_size: 64 * 1024,
        }
    }
}

/// Envelope decoder limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Largest accepted `Content-Length`, in bytes.
    pub max_content_length: u64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset (e.g. "info",
    /// "telemetry_harness=debug").
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
