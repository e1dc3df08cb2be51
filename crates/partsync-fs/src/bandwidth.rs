//! Bandwidth limiting for local snapshot streams
//!
//! Caps the number of bytes read from or written to a local snapshot per
//! second.
//!
//! ## Architecture
//!
//! - [`BandwidthLimiter`]: Sliding one-second window of granted quotas.
//!   [`get_quota`](BandwidthLimiter::get_quota) grants at most what is left
//!   in the current window and otherwise sleeps until the oldest grant leaves
//!   the window.
//! - [`LimitedReader`] / [`LimitedWriter`]: Clip every read/write to the
//!   granted quota before passing it through.
//!
//! Waiters queue on a FIFO `tokio::sync::Mutex` that is held while sleeping,
//! so quota is handed out in arrival order and no waiter starves.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use partsync_fs::bandwidth::{BandwidthLimiter, LimitedReader};
//!
//! # async fn example(file: tokio::fs::File) {
//! let limiter = Arc::new(BandwidthLimiter::new(8 * 1024 * 1024));
//! let reader = LimitedReader::new(file, limiter);
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Length of the window over which the limit applies
const WINDOW: Duration = Duration::from_secs(1);

type QuotaFuture = Pin<Box<dyn Future<Output = usize> + Send>>;

// ============================================================================
// BandwidthLimiter
// ============================================================================

/// Per-second byte budget shared by any number of streams
#[derive(Debug)]
pub struct BandwidthLimiter {
    /// Maximum bytes granted within any one-second window
    per_second_limit: u64,
    /// Grants still inside the window, oldest first
    grants: Mutex<VecDeque<(Instant, u64)>>,
}

impl BandwidthLimiter {
    /// Creates a limiter granting at most `per_second_limit` bytes per second.
    ///
    /// A limit of 0 is raised to 1.
    pub fn new(per_second_limit: u64) -> Self {
        Self {
            per_second_limit: per_second_limit.max(1),
            grants: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the configured limit in bytes per second
    pub fn per_second_limit(&self) -> u64 {
        self.per_second_limit
    }

    /// Waits for quota and returns how many of the `n` requested bytes may be
    /// transferred now.
    ///
    /// Never returns 0: a request for 0 bytes is treated as a request for 1.
    pub async fn get_quota(&self, n: usize) -> usize {
        let wanted = n.max(1) as u64;
        let mut grants = self.grants.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&(at, _)) = grants.front() {
                if now.duration_since(at) >= WINDOW {
                    grants.pop_front();
                } else {
                    break;
                }
            }

            let used: u64 = grants.iter().map(|&(_, bytes)| bytes).sum();
            let available = self.per_second_limit.saturating_sub(used);
            if available > 0 {
                let granted = wanted.min(available);
                grants.push_back((now, granted));
                return granted as usize;
            }

            let Some(&(oldest, _)) = grants.front() else {
                continue;
            };
            trace!(used, limit = self.per_second_limit, "Waiting for bandwidth quota");
            sleep_until(oldest + WINDOW).await;
        }
    }
}

// ============================================================================
// LimitedReader
// ============================================================================

/// Reader whose throughput is capped by a [`BandwidthLimiter`]
pub struct LimitedReader<R> {
    inner: R,
    limiter: Arc<BandwidthLimiter>,
    pending: Option<QuotaFuture>,
    granted: usize,
}

impl<R> LimitedReader<R> {
    pub fn new(inner: R, limiter: Arc<BandwidthLimiter>) -> Self {
        Self {
            inner,
            limiter,
            pending: None,
            granted: 0,
        }
    }
}

/// Polls for quota when none is left over from a previous call.
fn poll_quota(
    pending: &mut Option<QuotaFuture>,
    granted: &mut usize,
    limiter: &Arc<BandwidthLimiter>,
    wanted: usize,
    cx: &mut Context<'_>,
) -> Poll<()> {
    if *granted > 0 {
        return Poll::Ready(());
    }
    let future = pending.get_or_insert_with(|| {
        let limiter = limiter.clone();
        Box::pin(async move { limiter.get_quota(wanted).await })
    });
    match future.as_mut().poll(cx) {
        Poll::Ready(quota) => {
            *pending = None;
            *granted = quota;
            Poll::Ready(())
        }
        Poll::Pending => Poll::Pending,
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LimitedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        if poll_quota(
            &mut this.pending,
            &mut this.granted,
            &this.limiter,
            buf.remaining(),
            cx,
        )
        .is_pending()
        {
            return Poll::Pending;
        }

        let max = this.granted.min(buf.remaining());
        let n = {
            let unfilled = buf.initialize_unfilled_to(max);
            let mut clipped = ReadBuf::new(unfilled);
            match Pin::new(&mut this.inner).poll_read(cx, &mut clipped) {
                Poll::Ready(Ok(())) => clipped.filled().len(),
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => return Poll::Pending,
            }
        };
        buf.advance(n);
        this.granted -= n;
        Poll::Ready(Ok(()))
    }
}

// ============================================================================
// LimitedWriter
// ============================================================================

/// Writer whose throughput is capped by a [`BandwidthLimiter`]
pub struct LimitedWriter<W> {
    inner: W,
    limiter: Arc<BandwidthLimiter>,
    pending: Option<QuotaFuture>,
    granted: usize,
}

impl<W> LimitedWriter<W> {
    pub fn new(inner: W, limiter: Arc<BandwidthLimiter>) -> Self {
        Self {
            inner,
            limiter,
            pending: None,
            granted: 0,
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for LimitedWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if poll_quota(
            &mut this.pending,
            &mut this.granted,
            &this.limiter,
            buf.len(),
            cx,
        )
        .is_pending()
        {
            return Poll::Pending;
        }

        let max = this.granted.min(buf.len());
        match Pin::new(&mut this.inner).poll_write(cx, &buf[..max]) {
            Poll::Ready(Ok(n)) => {
                this.granted -= n;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
