//! Metrics collection.
//!
//! # Metrics
//! - `harness_connections_total` (counter): successful dial/accept rendezvous
//! - `harness_dial_failures_total` (counter): failed dials by reason
//! - `harness_envelopes_total` (counter): envelope requests by encoding, status

use crate::envelope::ContentKind;
use crate::net::ListenerError;

pub fn record_connection() {
    ::metrics::counter!("harness_connections_total").increment(1);
}

pub fn record_dial_failure(error: &ListenerError) {
    let reason = match error {
        ListenerError::Closed | ListenerError::AlreadyClosed => "closed",
        ListenerError::DialCancelled(_) => "cancelled",
    };
    ::metrics::counter!("harness_dial_failures_total", "reason" => reason).increment(1);
}

/// `kind` is the encoding the request declared, decoded or not. `None`
/// when its Content-Type is absent or not one the decoder accepts.
pub fn record_envelope(kind: Option<ContentKind>, status: u16) {
    let encoding = kind.map_or("unknown", |k| k.as_str());
    ::metrics::counter!(
        "harness_envelopes_total",
        "encoding" => encoding,
        "status" => status.to_string()
    )
    .increment(1);
}
