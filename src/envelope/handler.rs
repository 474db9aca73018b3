//! The envelope request handler.
//!
//! # Responsibilities
//! - Run the decoder for each request
//! - Pass envelopes to the downstream Router, or log them
//! - Turn failures into responses through the error policy
//!
//! # Design Decisions
//! - Configuration is fixed at construction; every field has a default
//! - The log sink and the error policy are replaceable independently

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, request::Parts, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::de::IgnoredAny;
use tower::ServiceExt;
use tracing::Level;

use crate::config::EnvelopeConfig;
use crate::envelope::decoder::decode;
use crate::envelope::error::EnvelopeError;
use crate::envelope::{ContentKind, Envelope};
use crate::observability::metrics;

/// Destination for the handler's log output.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Default sink: tracing events under `telemetry_harness::envelope`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        if level == Level::ERROR {
            tracing::error!(target: "telemetry_harness::envelope", "{message}");
        } else if level == Level::WARN {
            tracing::warn!(target: "telemetry_harness::envelope", "{message}");
        } else if level == Level::INFO {
            tracing::info!(target: "telemetry_harness::envelope", "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(target: "telemetry_harness::envelope", "{message}");
        } else {
            tracing::trace!(target: "telemetry_harness::envelope", "{message}");
        }
    }
}

/// Decides the response for a failed request.
///
/// Called once per failed request; the downstream Router does not run for
/// that request.
pub trait ErrorPolicy: Send + Sync {
    fn on_error(&self, log: &dyn LogSink, request: &Parts, error: &EnvelopeError) -> Response;
}

impl<F> ErrorPolicy for F
where
    F: Fn(&dyn LogSink, &Parts, &EnvelopeError) -> Response + Send + Sync,
{
    fn on_error(&self, log: &dyn LogSink, request: &Parts, error: &EnvelopeError) -> Response {
        self(log, request, error)
    }
}

/// Logs the error, then answers 400 for validation errors and 500 for
/// everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorPolicy;

impl ErrorPolicy for DefaultErrorPolicy {
    fn on_error(&self, log: &dyn LogSink, _request: &Parts, error: &EnvelopeError) -> Response {
        if error.is_validation() {
            log.log(Level::WARN, &error.to_string());
        } else {
            log.log(Level::ERROR, &format!("error handling envelope: {error}"));
        }
        error.status().into_response()
    }
}

/// Construction-time settings for `EnvelopeHandler`.
#[derive(Clone, Default)]
pub struct HandlerConfig {
    /// Decoding limits. Default: 32 MiB max content length.
    pub envelope: EnvelopeConfig,
    /// Where logs go. Default: `TracingSink`.
    pub logger: Option<Arc<dyn LogSink>>,
    /// How failures become responses. Default: `DefaultErrorPolicy`.
    pub error_policy: Option<Arc<dyn ErrorPolicy>>,
    /// Receives every decoded envelope, attached to the request. Default:
    /// none, envelopes are pretty-printed to the log sink and answered 200.
    pub downstream: Option<Router>,
}

/// Accepts telemetry submissions and decodes them into envelopes.
///
/// Meant for test and development setups: there is no authentication and
/// bodies up to the configured limit are buffered in memory.
#[derive(Clone)]
pub struct EnvelopeHandler {
    envelope: EnvelopeConfig,
    logger: Arc<dyn LogSink>,
    error_policy: Arc<dyn ErrorPolicy>,
    downstream: Option<Router>,
}

impl EnvelopeHandler {
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            envelope: config.envelope,
            logger: config.logger.unwrap_or_else(|| Arc::new(TracingSink)),
            error_policy: config
                .error_policy
                .unwrap_or_else(|| Arc::new(DefaultErrorPolicy)),
            downstream: config.downstream,
        }
    }

    /// Handle one request end to end.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        let (kind, response) = match decode(&parts, body, &self.envelope).await {
            Ok(envelope) => (Some(envelope.kind()), self.deliver(parts, envelope).await),
            Err(error) => (declared_kind(&parts.headers), self.fail(&parts, &error)),
        };

        metrics::record_envelope(kind, response.status().as_u16());
        response
    }

    /// A Router that sends every request, whatever its path, to this
    /// handler.
    pub fn into_router(self) -> Router {
        Router::new().fallback(serve_envelope).with_state(self)
    }

    async fn deliver(&self, parts: Parts, envelope: Envelope) -> Response {
        let Some(downstream) = &self.downstream else {
            return match self.log_envelope(&parts, &envelope) {
                Ok(()) => StatusCode::OK.into_response(),
                Err(error) => self.fail(&parts, &error),
            };
        };

        let mut request = Request::from_parts(parts, Body::empty());
        envelope.attach(&mut request);
        match downstream.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    fn fail(&self, parts: &Parts, error: &EnvelopeError) -> Response {
        tracing::debug!(
            method = %parts.method,
            uri = %parts.uri,
            error = %error,
            "Envelope rejected"
        );
        self.error_policy.on_error(&*self.logger, parts, error)
    }

    fn log_envelope(&self, parts: &Parts, envelope: &Envelope) -> Result<(), EnvelopeError> {
        let pretty = pretty_json(envelope.payload())?;
        let head = dump_request_head(parts);
        self.logger.log(Level::INFO, &format!("\n{head}{pretty}\n"));
        Ok(())
    }
}

async fn serve_envelope(State(handler): State<EnvelopeHandler>, request: Request<Body>) -> Response {
    handler.handle(request).await
}

/// The encoding a request's Content-Type asks for, whether or not decoding
/// got that far.
fn declared_kind(headers: &HeaderMap) -> Option<ContentKind> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| ContentKind::from_content_type(value.as_bytes()))
}

/// Re-indent a JSON document with two spaces.
///
/// Tokens are copied byte for byte: numbers keep their spelling and
/// duplicate keys survive. Only whitespace outside strings changes.
fn pretty_json(payload: &[u8]) -> Result<String, EnvelopeError> {
    serde_json::from_slice::<IgnoredAny>(payload).map_err(EnvelopeError::Format)?;

    let mut out = Vec::with_capacity(payload.len() * 2);
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut just_opened = false;

    for &byte in payload {
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        if matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
            continue;
        }
        if just_opened {
            just_opened = false;
            // Empty containers stay on one line.
            if matches!(byte, b'}' | b']') {
                depth = depth.saturating_sub(1);
                out.push(byte);
                continue;
            }
            push_newline(&mut out, depth);
        }
        match byte {
            b'"' => {
                in_string = true;
                out.push(byte);
            }
            b'{' | b'[' => {
                out.push(byte);
                depth += 1;
                just_opened = true;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                push_newline(&mut out, depth);
                out.push(byte);
            }
            b',' => {
                out.push(byte);
                push_newline(&mut out, depth);
            }
            b':' => out.extend_from_slice(b": "),
            _ => out.push(byte),
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn push_newline(out: &mut Vec<u8>, depth: usize) {
    out.push(b'\n');
    for _ in 0..depth {
        out.extend_from_slice(b"  ");
    }
}

/// Request line and headers as they would appear on the wire, ending with
/// the blank line. The body is not included.
fn dump_request_head(parts: &Parts) -> String {
    let target = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());
    let mut head = format!("{} {} {:?}\r\n", parts.method, target, parts.version);
    for (name, value) in &parts.headers {
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head
}
