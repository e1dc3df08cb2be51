//! Remote-side phases shared by backup and remote copy

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use partsync_core::domain::{parts_size, Part};
use partsync_core::ports::{IOriginFs, IRemoteFs};

use crate::counter::{progress_line, ByteCounter};
use crate::pool::run_parallel;

/// Backend that serves server-side copies
#[derive(Clone)]
pub(crate) enum CopySource {
    /// A read-only origin snapshot
    Origin(Arc<dyn IOriginFs>),
    /// A full remote backend, e.g. the source of a remote copy
    Remote(Arc<dyn IRemoteFs>),
}

impl CopySource {
    fn as_origin(&self) -> &dyn IOriginFs {
        match self {
            CopySource::Origin(origin) => origin.as_ref(),
            CopySource::Remote(remote) => remote.as_origin(),
        }
    }
}

impl fmt::Display for CopySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopySource::Origin(origin) => write!(f, "{origin}"),
            CopySource::Remote(remote) => write!(f, "{remote}"),
        }
    }
}

/// Deletes `parts` from `dst`, then prunes empty directories.
///
/// Returns the number of bytes the deleted parts held.
pub(crate) async fn delete_remote_parts(
    dst: &Arc<dyn IRemoteFs>,
    parts: Vec<Part>,
    concurrency: usize,
) -> Result<u64> {
    if parts.is_empty() {
        return Ok(0);
    }
    let total = parts_size(&parts);
    let deleted = ByteCounter::new();
    info!(parts = parts.len(), bytes = total, dst = %dst, "Deleting parts missing in source");

    let worker_dst = dst.clone();
    let worker_deleted = deleted.clone();
    run_parallel(
        concurrency,
        parts,
        move |part| {
            let dst = worker_dst.clone();
            let deleted = worker_deleted.clone();
            async move {
                debug!(%part, "Deleting part");
                dst.delete_part(&part)
                    .await
                    .with_context(|| format!("cannot delete {part} from {dst}"))?;
                deleted.add(part.size);
                Ok(())
            }
        },
        |elapsed| {
            info!(
                "deleted {} out of {} bytes from {} in {:?}",
                deleted.get(),
                total,
                dst,
                elapsed
            )
        },
    )
    .await?;

    dst.remove_empty_dirs()
        .await
        .with_context(|| format!("cannot remove empty directories at {dst}"))?;
    Ok(deleted.get())
}

/// Copies `parts` from `src` to `dst` without routing bytes through this
/// process.
///
/// Returns the number of bytes copied.
pub(crate) async fn copy_remote_parts(
    dst: &Arc<dyn IRemoteFs>,
    src: CopySource,
    parts: Vec<Part>,
    concurrency: usize,
) -> Result<u64> {
    if parts.is_empty() {
        return Ok(0);
    }
    let total = parts_size(&parts);
    let copied = ByteCounter::new();
    info!(parts = parts.len(), bytes = total, src = %src, dst = %dst, "Server-side copying parts");

    let worker_dst = dst.clone();
    let worker_src = src.clone();
    let worker_copied = copied.clone();
    run_parallel(
        concurrency,
        parts,
        move |part| {
            let dst = worker_dst.clone();
            let src = worker_src.clone();
            let copied = worker_copied.clone();
            async move {
                debug!(%part, "Server-side copying part");
                dst.copy_part(src.as_origin(), &part)
                    .await
                    .with_context(|| format!("cannot copy {part} from {src} to {dst}"))?;
                copied.add(part.size);
                Ok(())
            }
        },
        |elapsed| {
            info!(
                "{}",
                progress_line("server-side copied", copied.get(), total, &src, dst, elapsed)
            )
        },
    )
    .await?;
    Ok(copied.get())
}
