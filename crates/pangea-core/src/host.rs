//! The `Host` boundary.
//!
//! The P2P transport itself — peer discovery, NAT traversal, stream
//! multiplexing, encryption — is a collaborator this crate is handed, not
//! one it implements. `Host` is the minimal contract the service needs
//! from it: register a per-protocol inbound handler, dial an outbound
//! stream to a known peer with a deadline, and report the local identity.
//!
//! Any concrete P2P library is wired in by implementing this trait once,
//! outside this crate. See [`crate::testing::LoopbackHost`] for the
//! in-process double this crate's own tests are built on.

use crate::error::HostError;
use crate::types::PeerId;
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Any bidirectional byte stream the host hands us, erased to a trait object
/// so this crate never depends on a concrete transport's stream type.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// A boxed, type-erased bidirectional stream.
///
/// Plain `Box`, not `Pin<Box<_>>` — `Box` is already `Unpin`, and the
/// forwarding impls below let it satisfy `AsyncRead + AsyncWrite` directly
/// so it can be handed straight to `tokio::io::split`.
pub type BoxedStream = Box<dyn AsyncStream>;

impl AsyncRead for Box<dyn AsyncStream> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut **self).poll_read(cx, buf)
    }
}

impl AsyncWrite for Box<dyn AsyncStream> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut **self).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self).poll_shutdown(cx)
    }
}

/// Invoked by the host with `(remote peer identity, new inbound stream)`
/// whenever a stream arrives for a registered protocol. Must return quickly
/// — it is expected to hand the stream off to a freshly spawned reader task
/// rather than read from it directly.
pub type InboundHandler = Arc<dyn Fn(PeerId, BoxedStream) + Send + Sync>;

/// The P2P host contract this service is written against.
#[async_trait]
pub trait Host: Send + Sync {
    /// The local node's identity as the host sees it.
    fn local_peer_id(&self) -> PeerId;

    /// Registers (or replaces) the inbound handler for `protocol`.
    fn set_stream_handler(&self, protocol: &'static str, handler: InboundHandler);

    /// Dials a new outbound stream to `peer` on `protocol`, failing if
    /// `deadline` elapses first.
    async fn new_stream(
        &self,
        peer: PeerId,
        protocol: &'static str,
        deadline: Duration,
    ) -> Result<BoxedStream, HostError>;
}
