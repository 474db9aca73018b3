//! HTTP server over the in-process listener.
//!
//! # Responsibilities
//! - Create the Axum Router around the envelope handler
//! - Wire up middleware (tracing)
//! - Serve connections from the listener until it closes
//! - Hand out the dialer and a client bound to it

use std::future::Future;

use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::HarnessConfig;
use crate::envelope::{EnvelopeHandler, HandlerConfig};
use crate::http::client::HarnessClient;
use crate::net::{Dialer, Listener, ListenerError};

/// An HTTP server reachable only through its own dialer.
///
/// Closing the server closes its listener: new dials fail and the serve
/// loop shuts down gracefully.
pub struct HarnessServer {
    listener: Listener,
    dialer: Dialer,
    handler: EnvelopeHandler,
}

impl HarnessServer {
    /// Create the listener, dialer and handler without serving.
    pub fn new_unstarted(config: &HarnessConfig, handler: EnvelopeHandler) -> Self {
        let listener = Listener::new(&config.listener);
        let dialer = listener.new_dialer();
        Self {
            listener,
            dialer,
            handler,
        }
    }

    /// Start a server whose handler logs every envelope.
    pub fn new(config: &HarnessConfig) -> Self {
        let handler = EnvelopeHandler::new(HandlerConfig {
            envelope: config.envelope.clone(),
            ..Default::default()
        });
        Self::start(config, handler)
    }

    /// Like `new_unstarted`, and spawn the serve loop on the current tokio
    /// runtime.
    pub fn start(config: &HarnessConfig, handler: EnvelopeHandler) -> Self {
        let server = Self::new_unstarted(config, handler);
        server.spawn();
        server
    }

    /// Spawn `serve` on the current tokio runtime.
    pub fn spawn(&self) -> JoinHandle<std::io::Result<()>> {
        tokio::spawn(self.serve())
    }

    /// Serve connections until the listener is closed.
    pub fn serve(&self) -> impl Future<Output = std::io::Result<()>> + Send + 'static {
        let listener = self.listener.clone();
        let shutdown = listener.closed();
        let app = Self::build_router(self.handler.clone());

        async move {
            tracing::info!(address = %listener.local_addr(), "HTTP server starting");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;
            tracing::info!("HTTP server stopped");
            Ok(())
        }
    }

    fn build_router(handler: EnvelopeHandler) -> axum::Router {
        handler.into_router().layer(TraceLayer::new_for_http())
    }

    /// Close the listener.
    pub fn close(&self) -> Result<(), ListenerError> {
        self.listener.close()
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn dialer(&self) -> &Dialer {
        &self.dialer
    }

    /// A client whose requests reach this server.
    pub fn client(&self) -> HarnessClient {
        HarnessClient::new(self.dialer.clone())
    }
}
