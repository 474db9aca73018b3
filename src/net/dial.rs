//! Dialing side of the in-process broker.
//!
//! # Responsibilities
//! - Carry a caller's cancellation signal (`DialContext`)
//! - Race cancellation, listener close and rendezvous in one selection
//! - Hand the accept side its endpoint and return the other one
//!
//! # Design Decisions
//! - Network and address arguments exist for call-site compatibility with
//!   socket dialers and are ignored
//! - Priority when several signals are ready: cancel, then close, then
//!   rendezvous

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::net::connection::{ConnectionIds, PipeConn};
use crate::net::listener::{Handoff, ListenerError};
use crate::observability::metrics;

/// Why a dial gave up before reaching the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The context's cancel handle fired.
    Cancelled,
    /// The context's deadline passed.
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("context cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Cancellation signal for a dial: an optional deadline and an optional
/// cancel handle.
///
/// ```no_run
/// # use std::time::Duration;
/// # use telemetry_harness::net::DialContext;
/// let (ctx, cancel) = DialContext::background()
///     .with_timeout(Duration::from_secs(1))
///     .with_cancel();
/// cancel.cancel();
/// ```
#[derive(Debug, Clone, Default)]
pub struct DialContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl DialContext {
    /// A context that never fires.
    pub fn background() -> Self {
        Self::default()
    }

    /// Fire at `deadline`, or at the existing deadline if that is earlier.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Fire once `timeout` has elapsed from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a cancel handle. A context carries one handle; this replaces
    /// any earlier one.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    /// The reason this context has fired, if it has.
    pub fn err(&self) -> Option<CancelReason> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context fires. Pending forever for a background
    /// context or one whose cancel handle was dropped without cancelling.
    pub async fn done(&self) -> CancelReason {
        let cancelled = async {
            if let Some(rx) = &self.cancel {
                let mut rx = rx.clone();
                if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                    return;
                }
            }
            pending::<()>().await
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => CancelReason::Cancelled,
            _ = expired => CancelReason::DeadlineExceeded,
        }
    }
}

/// Fires the `DialContext` it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// A capability for dialing one listener.
///
/// Every dial reaches the listener this dialer was created from, whatever
/// network and address are passed. Dials fail once that listener closes.
#[derive(Debug, Clone)]
pub struct Dialer {
    pub(crate) handoff: Arc<Handoff>,
    pub(crate) closed: watch::Receiver<bool>,
    pub(crate) ids: ConnectionIds,
    pub(crate) buffer_size: usize,
}

impl Dialer {
    /// Dial with no deadline. Equivalent to `dial_context` with
    /// `DialContext::background()`.
    pub async fn dial(&self, network: &str, address: &str) -> Result<PipeConn, ListenerError> {
        self.dial_context(&DialContext::background(), network, address)
            .await
    }

    /// Wait for an accept call on the listener and return this side of the
    /// new connection.
    ///
    /// Exactly one of three outcomes: `ctx` fires first
    /// (`DialCancelled`), the listener closes first (`Closed`), or an
    /// accept call takes the peer endpoint.
    pub async fn dial_context(
        &self,
        ctx: &DialContext,
        _network: &str,
        _address: &str,
    ) -> Result<PipeConn, ListenerError> {
        let mut closed = self.closed.clone();

        let result = tokio::select! {
            biased;
            reason = ctx.done() => Err(ListenerError::DialCancelled(reason)),
            _ = wait_closed(&mut closed) => Err(ListenerError::Closed),
            conn = self.rendezvous() => Ok(conn),
        };

        match &result {
            Ok(conn) => {
                tracing::debug!(connection_id = %conn.id(), "Dial connected");
                metrics::record_connection();
            }
            Err(e) => {
                tracing::debug!(error = %e, "Dial failed");
                metrics::record_dial_failure(e);
            }
        }
        result
    }

    /// Take the next accept ticket and fulfil it.
    ///
    /// The ticket is filled synchronously after it is received, so a dial
    /// dropped by the surrounding select never loses an endpoint. Tickets
    /// outlive the accept call that posted them (see `Listener::accept`).
    async fn rendezvous(&self) -> PipeConn {
        let mut tickets = self.handoff.tickets.lock().await;
        loop {
            let Some(ticket) = tickets.recv().await else {
                return pending().await;
            };
            if ticket.is_closed() {
                continue;
            }
            let (local, remote) = PipeConn::pair(self.ids.next(), self.buffer_size);
            if ticket.send(remote).is_ok() {
                return local;
            }
        }
    }
}

/// Resolves once the closed flag is set or its sender is gone.
pub(crate) async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}
