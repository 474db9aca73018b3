//! In-memory connection endpoints.
//!
//! # Responsibilities
//! - Wrap one half of a `tokio::io::duplex` pair as a connection
//! - Give both halves of a pair the same `ConnectionId` for tracing
//! - Report a fixed `ipc` address in place of a socket address
//!
//! # Design Decisions
//! - Ids are counted per listener, not process-wide
//! - Endpoints outlive the listener that issued them

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Unique identifier for a connection, shared by both of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out connection ids for a single listener.
///
/// Relaxed ordering is enough: ids only need to be unique.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionIds(Arc<AtomicU64>);

impl ConnectionIds {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    pub(crate) fn next(&self) -> ConnectionId {
        ConnectionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// The address of every in-process endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IpcAddr;

impl IpcAddr {
    /// Name of the pseudo network, `"ipc"`.
    pub fn network(&self) -> &'static str {
        "ipc"
    }
}

impl std::fmt::Display for IpcAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ipc")
    }
}

/// One endpoint of a connected in-memory byte stream.
///
/// Reads wait for the peer to write and writes wait once the pipe buffer is
/// full. Dropping or shutting down one endpoint makes the peer read EOF.
#[derive(Debug)]
pub struct PipeConn {
    inner: DuplexStream,
    id: ConnectionId,
}

impl PipeConn {
    /// Create a connected pair of endpoints sharing `id`.
    pub(crate) fn pair(id: ConnectionId, buffer_size: usize) -> (PipeConn, PipeConn) {
        let (a, b) = tokio::io::duplex(buffer_size);
        (PipeConn { inner: a, id }, PipeConn { inner: b, id })
    }

    /// The id shared with the peer endpoint.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn local_addr(&self) -> IpcAddr {
        IpcAddr
    }

    pub fn peer_addr(&self) -> IpcAddr {
        IpcAddr
    }
}

impl AsyncRead for PipeConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
