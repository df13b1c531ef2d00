//! Byte-counting wrapper for upgraded duplex streams.
//!
//! Every successful read or write adds the number of bytes actually moved to
//! the connection's directional counter. Results, including EOF and errors,
//! are handed back untouched.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use vdimeter_core::{ChannelKind, StreamLabel};

use crate::obs::{ActiveStreamGuard, StreamCounters};

pub struct MeteredStream<S> {
    inner: S,
    kind: ChannelKind,
    label: StreamLabel,
    counters: StreamCounters,
    received: u64,
    sent: u64,
    // dropped after the close log line, together with the connection
    _active: Option<ActiveStreamGuard>,
}

impl<S> MeteredStream<S> {
    pub fn new(inner: S, kind: ChannelKind, label: StreamLabel, counters: StreamCounters) -> Self {
        Self {
            inner,
            kind,
            label,
            counters,
            received: 0,
            sent: 0,
            _active: None,
        }
    }

    /// Tie an active-stream gauge unit to the lifetime of this stream.
    pub fn with_active_guard(mut self, guard: ActiveStreamGuard) -> Self {
        self._active = Some(guard);
        self
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn label(&self) -> &StreamLabel {
        &self.label
    }

    /// Bytes read from the peer on this connection so far.
    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    /// Bytes written to the peer on this connection so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    fn record_received(&mut self, n: usize) {
        if n > 0 {
            self.counters.received.inc_by(n as u64);
            self.received += n as u64;
        }
    }

    fn record_sent(&mut self, n: usize) {
        if n > 0 {
            self.counters.sent.inc_by(n as u64);
            self.sent += n as u64;
        }
    }
}

impl<S> Drop for MeteredStream<S> {
    fn drop(&mut self) {
        tracing::debug!(
            kind = %self.kind,
            desktop = %self.label.endpoint,
            client = %self.label.peer,
            rx = self.received,
            tx = self.sent,
            "stream closed"
        );
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for MeteredStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let res = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = res {
            this.record_received(buf.filled().len().saturating_sub(before));
        }
        res
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for MeteredStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = res {
            this.record_sent(n);
        }
        res
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = res {
            this.record_sent(n);
        }
        res
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
