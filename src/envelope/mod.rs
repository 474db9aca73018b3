//! Telemetry envelope decoding subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request from the server layer
//!     → decoder.rs (method, Content-Length, Content-Type checks; body read)
//!     → codec.rs (base64 + zlib, compressed submissions only)
//!     → Envelope
//!     → handler.rs (downstream Router, or pretty-print to the log sink)
//!
//! On any error:
//!     → ErrorPolicy (status code + log line), downstream never runs
//! ```
//!
//! # Design Decisions
//! - Content-Length is checked before any allocation or read
//! - The payload stays opaque bytes; only the log path parses it
//! - Envelopes travel to the downstream Router in the request extensions
//!   under a private key, and are taken at most once

pub mod codec;
pub mod decoder;
pub mod error;
pub mod handler;

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap, Method, Request, StatusCode, Uri, Version};
use bytes::Bytes;
use serde::de::DeserializeOwned;

pub use codec::{decode_compressed, encode_compressed};
pub use decoder::decode;
pub use error::EnvelopeError;
pub use handler::{
    DefaultErrorPolicy, EnvelopeHandler, ErrorPolicy, HandlerConfig, LogSink, TracingSink,
};

/// Content type of raw JSON submissions.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of base64 + zlib submissions.
pub const COMPRESSED_CONTENT_TYPE: &str = "application/octet-stream";

/// How an envelope was encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// `application/json`: the body is the JSON document.
    Json,
    /// `application/octet-stream`: the body is base64(zlib(JSON)).
    Compressed,
}

impl ContentKind {
    /// Classify a Content-Type value. Matching is exact and case-sensitive.
    pub fn from_content_type(content_type: &[u8]) -> Option<Self> {
        if content_type == JSON_CONTENT_TYPE.as_bytes() {
            Some(ContentKind::Json)
        } else if content_type == COMPRESSED_CONTENT_TYPE.as_bytes() {
            Some(ContentKind::Compressed)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Json => "json",
            ContentKind::Compressed => "compressed",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ContentKind::Json => JSON_CONTENT_TYPE,
            ContentKind::Compressed => COMPRESSED_CONTENT_TYPE,
        }
    }
}

/// A decoded submission: its encoding, the JSON payload and the metadata of
/// the request that carried it.
#[derive(Debug, Clone)]
pub struct Envelope {
    kind: ContentKind,
    payload: Bytes,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl Envelope {
    pub(crate) fn new(kind: ContentKind, payload: Bytes, parts: &Parts) -> Self {
        Self {
            kind,
            payload,
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    /// The JSON document, byte for byte as the client produced it.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Deserialize the payload.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Remove the envelope attached to `request` by the handler.
    ///
    /// Returns `None` if there is none or it was already taken.
    pub fn take<B>(request: &mut Request<B>) -> Option<Envelope> {
        request
            .extensions_mut()
            .remove::<EnvelopeSlot>()
            .map(|slot| slot.0)
    }

    pub(crate) fn attach<B>(self, request: &mut Request<B>) {
        request.extensions_mut().insert(EnvelopeSlot(self));
    }
}

/// Extension key only this module can name.
#[derive(Clone)]
struct EnvelopeSlot(Envelope);

/// Lets downstream handlers take the envelope as an argument. Rejects with
/// 500 when the request did not come through an `EnvelopeHandler`.
impl<S> FromRequestParts<S> for Envelope
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .remove::<EnvelopeSlot>()
            .map(|slot| slot.0)
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
