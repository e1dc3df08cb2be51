//! Atomic byte counters and counting stream wrappers
//!
//! Transfer workers bump a [`ByteCounter`] on every read or write while the
//! progress reporter reads it concurrently, so the counter is a plain atomic.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Shared count of transferred bytes
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Formats a progress line such as
/// `uploaded 10 out of 20 bytes (50%) from fs:///a to fs:///b in 10s`.
pub fn progress_line(
    verb: &str,
    done: u64,
    total: u64,
    from: &dyn std::fmt::Display,
    to: &dyn std::fmt::Display,
    elapsed: Duration,
) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        100.0 * done as f64 / total as f64
    };
    format!("{verb} {done} out of {total} bytes ({percent:.2}%) from {from} to {to} in {elapsed:?}")
}

// ============================================================================
// CountingReader
// ============================================================================

/// Reader that adds every byte it yields to a per-stream count and to a
/// shared [`ByteCounter`]
pub struct CountingReader<R> {
    inner: R,
    count: u64,
    total: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, total: ByteCounter) -> Self {
        Self {
            inner,
            count: 0,
            total,
        }
    }

    /// Bytes read through this wrapper so far
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let n = (buf.filled().len() - before) as u64;
            this.count += n;
            this.total.add(n);
        }
        poll
    }
}

// ============================================================================
// CountingWriter
// ============================================================================

/// Writer that adds every byte it accepts to a per-stream count and to a
/// shared [`ByteCounter`]
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
    total: ByteCounter,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W, total: ByteCounter) -> Self {
        Self {
            inner,
            count: 0,
            total,
        }
    }

    /// Bytes written through this wrapper so far
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CountingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.count += *n as u64;
            this.total.add(*n as u64);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
