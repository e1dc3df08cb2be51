//! Bounded-concurrency worker pool
//!
//! Runs a unit of work over a list of parts (or over parts grouped by file
//! path) with a fixed number of workers.
//!
//! ## Flow
//!
//! ```text
//! producer ──→ work channel (bounded) ──→ N workers ──→ result channel (len(items))
//!                                             │
//!                                       stop token (first error)
//! ```
//!
//! On the first error the stop token is cancelled: workers finish the item
//! they are working on but never start another one, and the first error is
//! returned once every worker has exited. Progress is reported every
//! [`PROGRESS_INTERVAL`] while work runs and once more when it completes,
//! regardless of the outcome.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use partsync_core::domain::Part;

/// How often `on_progress` runs while work is in flight
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Public entry points
// ============================================================================

/// Runs `work` for every part using `concurrency` workers.
///
/// `concurrency` values below 1 are treated as 1. `on_progress` receives the
/// elapsed time since the start of the run.
pub async fn run_parallel<F, Fut>(
    concurrency: usize,
    parts: Vec<Part>,
    work: F,
    on_progress: impl FnMut(Duration),
) -> Result<()>
where
    F: Fn(Part) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    with_progress(run_workers(concurrency, parts, work), on_progress).await
}

/// Runs `work` once per file path using `concurrency` workers.
///
/// Each unit of work receives all parts of one path sorted by offset, so a
/// file is always extended from a valid prefix even though different files
/// are processed concurrently.
pub async fn run_parallel_per_path<F, Fut>(
    concurrency: usize,
    parts_by_path: BTreeMap<String, Vec<Part>>,
    work: F,
    on_progress: impl FnMut(Duration),
) -> Result<()>
where
    F: Fn(Vec<Part>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let groups: Vec<Vec<Part>> = parts_by_path
        .into_values()
        .map(|mut parts| {
            parts.sort_by_key(|p| p.offset);
            parts
        })
        .collect();
    with_progress(run_workers(concurrency, groups, work), on_progress).await
}

// ============================================================================
// Progress reporting
// ============================================================================

async fn with_progress<Fut>(work: Fut, mut on_progress: impl FnMut(Duration)) -> Result<()>
where
    Fut: Future<Output = Result<()>>,
{
    let start = Instant::now();
    let mut ticker = interval_at(start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(work);

    let result = loop {
        tokio::select! {
            result = &mut work => break result,
            _ = ticker.tick() => on_progress(start.elapsed()),
        }
    };
    on_progress(start.elapsed());
    result
}

// ============================================================================
// Workers
// ============================================================================

async fn run_workers<T, F, Fut>(concurrency: usize, items: Vec<T>, work: F) -> Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if items.is_empty() {
        return Ok(());
    }
    let workers_count = concurrency.max(1).min(items.len());
    debug!(items = items.len(), workers = workers_count, "Starting worker pool");

    let stop = CancellationToken::new();
    let (work_tx, work_rx) = mpsc::channel::<T>(workers_count);
    let work_rx = Arc::new(Mutex::new(work_rx));
    // Sized to hold every result so a worker never waits on the collector.
    let (result_tx, mut result_rx) = mpsc::channel::<Result<()>>(items.len());
    let work = Arc::new(work);

    let producer_stop = stop.clone();
    let producer = tokio::spawn(async move {
        for item in items {
            tokio::select! {
                _ = producer_stop.cancelled() => break,
                sent = work_tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut workers = JoinSet::new();
    for _ in 0..workers_count {
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        let stop = stop.clone();
        let work = work.clone();
        workers.spawn(async move {
            loop {
                if stop.is_cancelled() {
                    break;
                }
                let item = {
                    let mut rx = work_rx.lock().await;
                    rx.recv().await
                };
                let Some(item) = item else { break };
                if stop.is_cancelled() {
                    break;
                }
                let result = (*work)(item).await;
                if result.is_err() {
                    stop.cancel();
                }
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    let mut panicked = None;
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "Worker task failed");
            stop.cancel();
            panicked.get_or_insert(err);
        }
    }
    if let Err(err) = producer.await {
        panicked.get_or_insert(err);
    }

    while let Ok(result) = result_rx.try_recv() {
        result?;
    }
    match panicked {
        Some(err) => Err(anyhow::Error::new(err).context("worker pool task failed")),
        None => Ok(()),
    }
}
