//! In-process HTTP client.
//!
//! # Responsibilities
//! - Dial the harness listener instead of opening a socket
//! - Run one HTTP/1.1 exchange per connection
//! - Build correctly-framed envelope submissions

use axum::http::{header, Request, Response};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;

use crate::envelope::{encode_compressed, ContentKind};
use crate::net::{DialContext, Dialer, ListenerError};

/// Error type for client requests.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to dial harness: {0}")]
    Dial(#[from] ListenerError),
    #[error("failed to build request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] std::io::Error),
    #[error("HTTP exchange failed: {0}")]
    Http(#[from] hyper::Error),
}

/// Sends HTTP requests to a harness server through its dialer.
#[derive(Debug, Clone)]
pub struct HarnessClient {
    dialer: Dialer,
}

impl HarnessClient {
    pub fn new(dialer: Dialer) -> Self {
        Self { dialer }
    }

    /// Send a request and collect the whole response.
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, ClientError> {
        self.send_with(&DialContext::background(), request).await
    }

    /// Like `send`, giving up on the dial when `ctx` fires.
    pub async fn send_with(
        &self,
        ctx: &DialContext,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Bytes>, ClientError> {
        let conn = self.dialer.dial_context(ctx, "tcp", "localhost:80").await?;
        let connection_id = conn.id();

        let (mut sender, connection) = http1::handshake(TokioIo::new(conn)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(connection_id = %connection_id, error = %e, "Client connection error");
            }
        });

        let response = sender.send_request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(Response::from_parts(parts, body))
    }

    /// POST a raw JSON envelope.
    pub async fn post_json(
        &self,
        path: &str,
        json: impl Into<Bytes>,
    ) -> Result<Response<Bytes>, ClientError> {
        let request = submission(path, ContentKind::Json, json.into())?;
        self.send(request).await
    }

    /// POST an envelope as base64(zlib(json)).
    pub async fn post_compressed(&self, path: &str, json: &[u8]) -> Result<Response<Bytes>, ClientError> {
        let body = encode_compressed(json)?;
        let request = submission(path, ContentKind::Compressed, Bytes::from(body))?;
        self.send(request).await
    }
}

fn submission(path: &str, kind: ContentKind, body: Bytes) -> Result<Request<Full<Bytes>>, ClientError> {
    let request = Request::post(path)
        .header(header::HOST, "localhost")
        .header(header::CONTENT_TYPE, kind.content_type())
        .header(header::CONTENT_LENGTH, body.len())
        .body(Full::new(body))?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_is_framed() {
        let request = submission("/api/1/store/", ContentKind::Compressed, Bytes::from_static(b"eJyrrgUAAXUA+Q==")).unwrap();
        assert_eq!(request.method(), &axum::http::Method::POST);
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(request.headers()[header::CONTENT_LENGTH], "16");
    }

    #[tokio::test]
    async fn closed_listener_fails_send() {
        let listener = crate::net::listen();
        let client = HarnessClient::new(listener.new_dialer());
        listener.close().unwrap();

        let err = client.post_json("/api/1/store/", "{}").await.unwrap_err();
        assert!(matches!(err, ClientError::Dial(ListenerError::Closed)));
    }
}
