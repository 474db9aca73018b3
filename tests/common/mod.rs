//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::Level;

use telemetry_harness::config::ObservabilityConfig;
use telemetry_harness::envelope::LogSink;
use telemetry_harness::observability::init_logging;
use telemetry_harness::{Envelope, EnvelopeHandler, HandlerConfig, HarnessConfig, HarnessServer, Listener};

/// A Sentry-style event, as a client library would submit it.
pub const EVENT: &[u8] = br#"{"event_id":"9ec79c33ec9942ab8353589fcb2e04dc","platform":"rust","level":"error","exception":[{"type":"Error","value":"A bad error"}]}"#;

/// Log sink that keeps every line.
#[derive(Default)]
pub struct CaptureSink(Mutex<Vec<(Level, String)>>);

impl CaptureSink {
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.0.lock().unwrap().clone()
    }
}

impl LogSink for CaptureSink {
    fn log(&self, level: Level, message: &str) {
        self.0.lock().unwrap().push((level, message.to_string()));
    }
}

/// Install the fmt subscriber once per test binary.
pub fn init_test_logging() {
    let _ = init_logging(&ObservabilityConfig::default());
}

/// Start a server whose downstream forwards every envelope to the returned
/// receiver.
pub fn start_forwarding_server() -> (HarnessServer, mpsc::UnboundedReceiver<Envelope>, Arc<CaptureSink>) {
    init_test_logging();
    let (tx, rx) = mpsc::unbounded_channel();
    let downstream = Router::new().fallback(move |envelope: Envelope| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(envelope);
            StatusCode::OK
        }
    });

    let sink = Arc::new(CaptureSink::default());
    let handler = EnvelopeHandler::new(HandlerConfig {
        logger: Some(sink.clone()),
        downstream: Some(downstream),
        ..Default::default()
    });
    let server = HarnessServer::start(&HarnessConfig::default(), handler);
    (server, rx, sink)
}

/// Accept connections until the listener closes; each connection echoes
/// back what it reads.
pub fn start_echo_loop(listener: Listener) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(mut conn) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    })
}
