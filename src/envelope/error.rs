//! Envelope decoding errors.

use axum::http::{Method, StatusCode};

/// Everything that can go wrong turning a request into an `Envelope`.
///
/// The first three variants are client errors (400); the rest are internal
/// failures (500).
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("bad HTTP method from client: {method}")]
    BadMethod { method: Method },

    /// `declared` is `None` when Content-Length is missing or unparseable.
    #[error("bad content length from client: {}", describe_length(.declared))]
    BadContentLength { declared: Option<u64> },

    #[error("bad content type from client: {}", describe_content_type(.content_type))]
    BadContentType { content_type: Option<String> },

    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),

    #[error("short request body: expected {expected} bytes, read {actual}")]
    ShortRead { expected: u64, actual: usize },

    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to inflate zlib body: {0}")]
    Inflate(#[source] std::io::Error),

    #[error("failed to format payload as JSON: {0}")]
    Format(#[source] serde_json::Error),
}

impl EnvelopeError {
    /// True for errors caused by a malformed submission.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EnvelopeError::BadMethod { .. }
                | EnvelopeError::BadContentLength { .. }
                | EnvelopeError::BadContentType { .. }
        )
    }

    /// Status the default error policy answers with.
    pub fn status(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn describe_length(declared: &Option<u64>) -> String {
    match declared {
        Some(length) => length.to_string(),
        None => "missing".to_string(),
    }
}

fn describe_content_type(content_type: &Option<String>) -> &str {
    content_type.as_deref().unwrap_or("missing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = EnvelopeError::BadContentLength { declared: Some(0) };
        assert!(err.is_validation());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "bad content length from client: 0");

        let err = EnvelopeError::BadContentType { content_type: None };
        assert_eq!(err.to_string(), "bad content type from client: missing");
    }

    #[test]
    fn processing_errors_are_internal() {
        let err = EnvelopeError::ShortRead {
            expected: 10,
            actual: 4,
        };
        assert!(!err.is_validation());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
