//! Request validation and body decoding.
//!
//! # Responsibilities
//! - Reject anything but POST
//! - Reject missing, zero or oversized Content-Length before reading
//! - Classify by Content-Type and recover the JSON document
//!
//! # Design Decisions
//! - First failing check wins, in the order above
//! - Body reads are capped at the declared length

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, Method};

use crate::config::EnvelopeConfig;
use crate::envelope::codec::decode_compressed;
use crate::envelope::error::EnvelopeError;
use crate::envelope::{ContentKind, Envelope};

/// Validate a request and decode its body into an `Envelope`.
pub async fn decode(
    parts: &Parts,
    body: Body,
    config: &EnvelopeConfig,
) -> Result<Envelope, EnvelopeError> {
    if parts.method != Method::POST {
        return Err(EnvelopeError::BadMethod {
            method: parts.method.clone(),
        });
    }

    let declared = declared_length(&parts.headers);
    let length = match declared {
        Some(length) if length > 0 && length <= config.max_content_length => length,
        _ => return Err(EnvelopeError::BadContentLength { declared }),
    };
    let limit =
        usize::try_from(length).map_err(|_| EnvelopeError::BadContentLength { declared })?;

    let content_type = parts.headers.get(header::CONTENT_TYPE);
    let kind = content_type
        .and_then(|value| ContentKind::from_content_type(value.as_bytes()))
        .ok_or_else(|| EnvelopeError::BadContentType {
            content_type: content_type.map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned()),
        })?;

    let body = axum::body::to_bytes(body, limit)
        .await
        .map_err(EnvelopeError::Read)?;

    let payload = match kind {
        ContentKind::Json => {
            if body.len() < limit {
                return Err(EnvelopeError::ShortRead {
                    expected: length,
                    actual: body.len(),
                });
            }
            body
        }
        ContentKind::Compressed => decode_compressed(&body)?,
    };

    tracing::debug!(
        encoding = kind.as_str(),
        declared_length = length,
        payload_length = payload.len(),
        "Envelope decoded"
    );

    Ok(Envelope::new(kind, payload, parts))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
