//! In-process listener with socket-style accept semantics.
//!
//! # Responsibilities
//! - Register waiting accept calls as one-shot tickets
//! - Track the open → closed transition
//! - Issue dialers bound to this listener
//! - Serve as an `axum::serve::Listener`
//!
//! # Design Decisions
//! - No backlog: a dial succeeds only by handing its endpoint straight to
//!   a waiting accept call
//! - Close is a compare-and-set on a watch channel, so exactly one caller
//!   sees `Ok`
//! - Closing never touches connections already handed out
//! - Accept is cancel-safe: a dropped accept call parks its ticket and the
//!   next accept call resumes it, so a dial that succeeded is never orphaned

use std::collections::VecDeque;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use std::task::{ready, Context, Poll};

use tokio::sync::{mpsc, oneshot, watch, Mutex};

use crate::config::ListenerConfig;
use crate::net::connection::{ConnectionIds, IpcAddr, PipeConn};
use crate::net::dial::{wait_closed, CancelReason, Dialer};

/// Error type for listener and dialer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// The listener is closed: returned by accept and by dials.
    #[error("listener was closed")]
    Closed,
    /// `close` was called on a listener that was already closed.
    #[error("listener was already closed")]
    AlreadyClosed,
    /// The dial's context fired before a connection was made.
    #[error("dial cancelled: {0}")]
    DialCancelled(CancelReason),
}

/// A waiting accept call's slot for its endpoint.
pub(crate) type Ticket = oneshot::Sender<PipeConn>;

/// Queue of accept tickets shared by a listener and its dialers.
#[derive(Debug)]
pub(crate) struct Handoff {
    post: mpsc::UnboundedSender<Ticket>,
    pub(crate) tickets: Mutex<mpsc::UnboundedReceiver<Ticket>>,
    /// Receiving ends of posted tickets whose accept call was dropped,
    /// oldest first.
    parked: std::sync::Mutex<VecDeque<oneshot::Receiver<PipeConn>>>,
}

impl Handoff {
    fn new() -> Self {
        let (post, tickets) = mpsc::unbounded_channel();
        Self {
            post,
            tickets: Mutex::new(tickets),
            parked: std::sync::Mutex::new(VecDeque::new()),
        }
    }

    fn park(&self, delivery: oneshot::Receiver<PipeConn>) {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(delivery);
    }

    fn unpark(&self) -> Option<oneshot::Receiver<PipeConn>> {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

/// An accept call's claim on one posted ticket.
///
/// Dropped before it resolves, it parks the receiver in the handoff, with
/// any endpoint a dialer already put there.
struct Delivery {
    rx: Option<oneshot::Receiver<PipeConn>>,
    handoff: Arc<Handoff>,
}

impl Delivery {
    fn new(rx: oneshot::Receiver<PipeConn>, handoff: &Arc<Handoff>) -> Self {
        Self {
            rx: Some(rx),
            handoff: Arc::clone(handoff),
        }
    }
}

impl Future for Delivery {
    type Output = Result<PipeConn, oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Pending;
        };
        let delivered = ready!(Pin::new(rx).poll(cx));
        self.rx = None;
        Poll::Ready(delivered)
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            self.handoff.park(rx);
        }
    }
}

/// An intra-process listener that hands out in-memory connections.
///
/// Clones share state: closing one clone closes them all. Dropping every
/// clone has the same effect on dialers as closing.
#[derive(Debug, Clone)]
pub struct Listener {
    handoff: Arc<Handoff>,
    closed: Arc<watch::Sender<bool>>,
    ids: ConnectionIds,
    buffer_size: usize,
}

impl Listener {
    /// Create a listener with the given configuration.
    pub fn new(config: &ListenerConfig) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            handoff: Arc::new(Handoff::new()),
            closed: Arc::new(closed),
            ids: ConnectionIds::new(),
            buffer_size: config.pipe_buffer_size,
        }
    }

    /// Wait for the next connection.
    ///
    /// Returns `ListenerError::Closed` once the listener is closed. An
    /// endpoint a dialer already handed over is returned even if the close
    /// is observed at the same time.
    ///
    /// Cancel-safe: if this future is dropped, its ticket stays posted and
    /// the next accept call takes over, including an endpoint delivered in
    /// the meantime.
    pub async fn accept(&self) -> Result<PipeConn, ListenerError> {
        let conn = self.accept_conn().await?;
        tracing::debug!(connection_id = %conn.id(), "Connection accepted");
        Ok(conn)
    }

    async fn accept_conn(&self) -> Result<PipeConn, ListenerError> {
        let mut closed = self.closed.subscribe();
        loop {
            let mut delivery = match self.handoff.unpark() {
                Some(rx) => Delivery::new(rx, &self.handoff),
                None => {
                    if *closed.borrow_and_update() {
                        return Err(ListenerError::Closed);
                    }
                    let (ticket, rx) = oneshot::channel();
                    if self.handoff.post.send(ticket).is_err() {
                        return Err(ListenerError::Closed);
                    }
                    Delivery::new(rx, &self.handoff)
                }
            };

            tokio::select! {
                biased;
                delivered = &mut delivery => {
                    if let Ok(conn) = delivered {
                        return Ok(conn);
                    }
                }
                _ = wait_closed(&mut closed) => return Err(ListenerError::Closed),
            }
        }
    }

    /// Close the listener, failing every pending and future accept and dial.
    ///
    /// The first call returns `Ok`; later calls return
    /// `ListenerError::AlreadyClosed`.
    pub fn close(&self) -> Result<(), ListenerError> {
        let transitioned = self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });

        if transitioned {
            tracing::info!("Listener closed");
            Ok(())
        } else {
            Err(ListenerError::AlreadyClosed)
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the listener is closed.
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut closed = self.closed.subscribe();
        async move { wait_closed(&mut closed).await }
    }

    /// A dialer for this listener. Dialers created after close fail when
    /// they dial.
    pub fn new_dialer(&self) -> Dialer {
        Dialer {
            handoff: Arc::clone(&self.handoff),
            closed: self.closed.subscribe(),
            ids: self.ids.clone(),
            buffer_size: self.buffer_size,
        }
    }

    pub fn local_addr(&self) -> IpcAddr {
        IpcAddr
    }
}

/// Create a listener with the default configuration.
pub fn listen() -> Listener {
    Listener::new(&ListenerConfig::default())
}

impl axum::serve::Listener for Listener {
    type Io = PipeConn;
    type Addr = IpcAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.accept_conn().await {
            Ok(conn) => (conn, IpcAddr),
            // axum's accept cannot fail; the server stops through its
            // graceful shutdown signal instead.
            Err(_) => pending().await,
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(IpcAddr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::dial::DialContext;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn dial_meets_accept() {
        let listener = listen();
        let dialer = listener.new_dialer();

        let accept = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.accept().await })
        };

        let mut client = dialer.dial("tcp", "ignored:80").await.unwrap();
        let mut server = accept.await.unwrap().unwrap();
        assert_eq!(client.id(), server.id());

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn close_twice() {
        let listener = listen();
        assert!(!listener.is_closed());
        assert_eq!(listener.close(), Ok(()));
        assert_eq!(listener.close(), Err(ListenerError::AlreadyClosed));
        assert!(listener.is_closed());
    }

    #[tokio::test]
    async fn close_wakes_blocked_accept() {
        let listener = listen();
        let accept = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.accept().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        listener.close().unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), accept)
            .await
            .expect("accept should not hang after close")
            .unwrap();
        assert_eq!(result.unwrap_err(), ListenerError::Closed);
    }

    #[tokio::test]
    async fn dial_after_close_fails() {
        let listener = listen();
        listener.close().unwrap();
        let dialer = listener.new_dialer();
        assert_eq!(dialer.dial("", "").await.unwrap_err(), ListenerError::Closed);
    }

    #[tokio::test]
    async fn close_wakes_blocked_dial() {
        let listener = listen();
        let dialer = listener.new_dialer();
        let dial = tokio::spawn(async move { dialer.dial("", "").await.map(|c| c.id()) });
        tokio::time::sleep(Duration::from_millis(10)).await;

        listener.close().unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), dial)
            .await
            .expect("dial should not hang after close")
            .unwrap();
        assert_eq!(result.unwrap_err(), ListenerError::Closed);
    }

    #[tokio::test]
    async fn dropping_listener_fails_dials() {
        let listener = listen();
        let dialer = listener.new_dialer();
        drop(listener);
        assert_eq!(dialer.dial("", "").await.unwrap_err(), ListenerError::Closed);
    }

    #[tokio::test]
    async fn cancelled_dial_without_accept() {
        let listener = listen();
        let dialer = listener.new_dialer();
        let (ctx, cancel) = DialContext::background().with_cancel();
        cancel.cancel();

        let err = dialer.dial_context(&ctx, "", "").await.unwrap_err();
        assert_eq!(err, ListenerError::DialCancelled(CancelReason::Cancelled));
    }

    #[tokio::test]
    async fn cancel_beats_pending_accept() {
        let listener = listen();
        let dialer = listener.new_dialer();
        let accept = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.accept().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (ctx, cancel) = DialContext::background().with_cancel();
        cancel.cancel();
        let err = dialer.dial_context(&ctx, "", "").await.unwrap_err();
        assert_eq!(err, ListenerError::DialCancelled(CancelReason::Cancelled));

        // The accept call is still waiting and gets the next dial.
        let client = dialer.dial("", "").await.unwrap();
        let server = accept.await.unwrap().unwrap();
        assert_eq!(client.id(), server.id());
    }

    #[tokio::test]
    async fn dial_times_out_without_accept() {
        let listener = listen();
        let dialer = listener.new_dialer();
        let ctx = DialContext::background().with_timeout(Duration::from_millis(20));

        let err = dialer.dial_context(&ctx, "", "").await.unwrap_err();
        assert_eq!(
            err,
            ListenerError::DialCancelled(CancelReason::DeadlineExceeded)
        );
    }

    #[tokio::test]
    async fn abandoned_accept_ticket_is_reused() {
        let listener = listen();
        let dialer = listener.new_dialer();

        // Register a ticket and abandon it.
        let abandoned = tokio::time::timeout(Duration::from_millis(10), listener.accept()).await;
        assert!(abandoned.is_err());

        let accept = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.accept().await })
        };
        let client = dialer.dial("", "").await.unwrap();
        let server = accept.await.unwrap().unwrap();
        assert_eq!(client.id(), server.id());
    }

    #[tokio::test]
    async fn endpoint_survives_dropped_accept() {
        let listener = listen();
        let dialer = listener.new_dialer();

        let mut accept = Box::pin(listener.accept());
        assert!(tokio::time::timeout(Duration::from_millis(10), &mut accept)
            .await
            .is_err());

        // The dial fills the pending ticket, then the accept call goes away.
        let mut client = dialer.dial("", "").await.unwrap();
        drop(accept);

        let mut server = tokio::time::timeout(Duration::from_secs(1), listener.accept())
            .await
            .expect("next accept should receive the delivered endpoint")
            .unwrap();
        assert_eq!(client.id(), server.id());

        client.write_all(b"kept").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"kept");
    }

    #[tokio::test]
    async fn delivered_endpoint_wins_over_close() {
        let listener = listen();
        let dialer = listener.new_dialer();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), listener.accept()).await;
        assert!(abandoned.is_err());
        let client = dialer.dial("", "").await.unwrap();
        listener.close().unwrap();

        let server = listener.accept().await.unwrap();
        assert_eq!(client.id(), server.id());
        assert_eq!(listener.accept().await.unwrap_err(), ListenerError::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_accepts_do_not_pile_up() {
        let listener = listen();
        for _ in 0..100 {
            let abandoned = tokio::time::timeout(Duration::from_millis(1), listener.accept()).await;
            assert!(abandoned.is_err());
        }

        assert_eq!(listener.handoff.tickets.lock().await.len(), 1);
        assert_eq!(listener.handoff.parked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_future_resolves() {
        let listener = listen();
        let closed = listener.closed();
        listener.close().unwrap();
        tokio::time::timeout(Duration::from_secs(1), closed)
            .await
            .expect("closed() should resolve after close");
    }
}
