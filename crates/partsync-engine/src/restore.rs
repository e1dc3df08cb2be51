//! Restore orchestrator
//!
//! Computes and executes a one-way sync from a remote backup back into a
//! local snapshot directory. More defensive than backup: the directory is
//! locked for the whole run, the source must carry the completion marker
//! and must tile every file exactly, and an interrupted restore resumes from
//! whatever prefix of each file is already on disk.
//!
//! ## Restore Flow
//!
//! 1. Lock the destination and create the `restore-in-progress` marker
//! 2. Require the completion marker on the source (unless skipped)
//! 3. List and validate the source parts
//! 4. Delete local files whose first part is not among the source parts,
//!    prune empty dirs and list again
//! 5. Download the missing parts grouped per file, in offset order
//! 6. Remove the `restore-in-progress` marker; the lock is released on drop

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use partsync_core::config::Config;
use partsync_core::domain::names::{BACKUP_COMPLETE_FILENAME, RESTORE_IN_PROGRESS_FILENAME};
use partsync_core::domain::{
    difference, group_by_path, parts_size, sort_parts, validate_coverage, Part,
};
use partsync_core::ports::{IRemoteFs, ISnapshotFs};

use crate::counter::{progress_line, ByteCounter, CountingWriter};
use crate::pool::run_parallel_per_path;
use crate::EngineError;

// ============================================================================
// RestoreResult
// ============================================================================

/// Summary of a completed restore
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreResult {
    /// Bytes of local files deleted before downloading
    pub deleted_bytes: u64,
    /// Bytes downloaded from the source
    pub downloaded_bytes: u64,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

// ============================================================================
// Restore
// ============================================================================

/// One-way sync from a remote backup into a local snapshot
pub struct Restore {
    src: Arc<dyn IRemoteFs>,
    dst: Arc<dyn ISnapshotFs>,
    concurrency: usize,
    skip_backup_complete_check: bool,
}

impl Restore {
    /// Creates a restore run
    ///
    /// Bandwidth limiting is a property of `dst`.
    pub fn new(src: Arc<dyn IRemoteFs>, dst: Arc<dyn ISnapshotFs>, config: &Config) -> Self {
        Self {
            src,
            dst,
            concurrency: config.effective_concurrency(),
            skip_backup_complete_check: config.restore.skip_backup_complete_check,
        }
    }

    /// Executes the restore
    #[tracing::instrument(skip(self), fields(src = %self.src, dst = %self.dst))]
    pub async fn run(&self) -> Result<RestoreResult> {
        let started = Instant::now();
        info!("Starting restore");

        let lock = self
            .dst
            .lock()
            .await
            .with_context(|| format!("cannot lock {}", self.dst))?;
        self.dst
            .create_marker(RESTORE_IN_PROGRESS_FILENAME)
            .await
            .with_context(|| {
                format!("cannot create {RESTORE_IN_PROGRESS_FILENAME} at {}", self.dst)
            })?;

        if !self.skip_backup_complete_check {
            let complete = self
                .src
                .has_file(BACKUP_COMPLETE_FILENAME)
                .await
                .with_context(|| {
                    format!("cannot check for {BACKUP_COMPLETE_FILENAME} at {}", self.src)
                })?;
            if !complete {
                return Err(EngineError::BackupIncomplete {
                    src: self.src.to_string(),
                    marker: BACKUP_COMPLETE_FILENAME,
                }
                .into());
            }
        }

        let src_parts = self
            .src
            .list_parts()
            .await
            .with_context(|| format!("cannot list src parts at {}", self.src))?;
        info!(parts = src_parts.len(), "Obtained src parts");
        validate_coverage(&src_parts)
            .map_err(EngineError::from)
            .with_context(|| format!("cannot restore from {}", self.src))?;

        let dst_parts = self.list_local_parts(&src_parts).await?;
        info!(parts = dst_parts.len(), "Obtained dst parts");

        let to_delete = difference(&dst_parts, &src_parts);
        let deleted_bytes = self.delete_local_files(&to_delete).await?;
        let dst_parts = if !to_delete.is_empty() {
            self.dst
                .remove_empty_dirs()
                .await
                .with_context(|| format!("cannot remove empty directories at {}", self.dst))?;
            self.list_local_parts(&src_parts).await?
        } else {
            dst_parts
        };

        let to_copy = difference(&src_parts, &dst_parts);
        let downloaded_bytes = self.download_parts(to_copy).await?;

        self.dst
            .remove_marker(RESTORE_IN_PROGRESS_FILENAME)
            .await
            .with_context(|| {
                format!("cannot remove {RESTORE_IN_PROGRESS_FILENAME} at {}", self.dst)
            })?;
        lock.release();

        let result = RestoreResult {
            deleted_bytes,
            downloaded_bytes,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            deleted_bytes = result.deleted_bytes,
            downloaded_bytes = result.downloaded_bytes,
            duration_ms = result.duration_ms,
            "Restore complete"
        );
        Ok(result)
    }

    async fn list_local_parts(&self, src_parts: &[Part]) -> Result<Vec<Part>> {
        let parts = self
            .dst
            .list_parts()
            .await
            .with_context(|| format!("cannot list dst parts at {}", self.dst))?;
        Ok(adopt_partial_files(parts, src_parts))
    }

    /// Deletes every local file whose offset-0 part is scheduled for deletion.
    ///
    /// Files missing only trailing parts are left alone so a previous,
    /// interrupted restore can be completed instead of restarted.
    async fn delete_local_files(&self, to_delete: &[Part]) -> Result<u64> {
        let paths: BTreeSet<&str> = to_delete
            .iter()
            .filter(|p| p.offset == 0)
            .map(|p| p.path.as_str())
            .collect();
        let mut deleted = 0;
        for path in paths {
            debug!(path, "Deleting local file");
            deleted += self
                .dst
                .delete_path(path)
                .await
                .with_context(|| format!("cannot delete {path:?} at {}", self.dst))?;
        }
        if deleted > 0 {
            info!(bytes = deleted, dst = %self.dst, "Deleted local files missing in source");
        }
        Ok(deleted)
    }

    async fn download_parts(&self, parts: Vec<Part>) -> Result<u64> {
        if parts.is_empty() {
            return Ok(0);
        }
        let total = parts_size(&parts);
        let downloaded = ByteCounter::new();
        let by_path = group_by_path(parts);
        info!(files = by_path.len(), bytes = total, "Downloading parts");

        let src = self.src.clone();
        let dst = self.dst.clone();
        let worker_downloaded = downloaded.clone();
        run_parallel_per_path(
            self.concurrency,
            by_path,
            move |parts| {
                let src = src.clone();
                let dst = dst.clone();
                let downloaded = worker_downloaded.clone();
                async move {
                    for part in parts {
                        debug!(%part, "Downloading part");
                        let writer = dst
                            .open_part_writer(&part)
                            .await
                            .with_context(|| format!("cannot create {part} at {dst}"))?;
                        let mut writer = CountingWriter::new(writer, downloaded.clone());
                        src.download_part(&part, &mut writer)
                            .await
                            .with_context(|| format!("cannot download {part} from {src}"))?;
                        writer
                            .shutdown()
                            .await
                            .with_context(|| format!("cannot finish {part} at {dst}"))?;
                        if writer.count() != part.size {
                            return Err(EngineError::ShortTransfer {
                                got: writer.count(),
                                want: part.size,
                                part,
                            }
                            .into());
                        }
                    }
                    Ok(())
                }
            },
            |elapsed| {
                info!(
                    "{}",
                    progress_line(
                        "downloaded",
                        downloaded.get(),
                        total,
                        &self.src,
                        &self.dst,
                        elapsed
                    )
                )
            },
        )
        .await?;
        Ok(downloaded.get())
    }
}

// ============================================================================
// Partial file adoption
// ============================================================================

/// Re-expresses local files that are a prefix of a source file in terms of
/// the source's parts.
///
/// A local file covering bytes `[0, L)` with `L <= source file_size` becomes
/// the source parts lying entirely below `L`, plus a remainder part when `L`
/// ends inside a source part. The remainder never matches a source part, so
/// it is scheduled for deletion: at a non-zero offset that only means the
/// matching source part gets downloaded over it; at offset 0 the whole file
/// is restarted. Files absent from the source, or longer than the source
/// file, are returned unchanged.
fn adopt_partial_files(local: Vec<Part>, src_parts: &[Part]) -> Vec<Part> {
    let src_by_path = group_by_path(src_parts.to_vec());
    let local_by_path: BTreeMap<String, Vec<Part>> = group_by_path(local);

    let mut adopted = Vec::new();
    for (path, local_parts) in local_by_path {
        let Some(src_file) = src_by_path.get(&path) else {
            adopted.extend(local_parts);
            continue;
        };
        let src_file_size = src_file[0].file_size;
        let covered = covered_prefix(&local_parts);
        if covered > src_file_size {
            adopted.extend(local_parts);
            continue;
        }

        for part in src_file {
            if part.end() <= covered {
                adopted.push(part.clone());
            } else if part.offset < covered {
                let remainder = covered - part.offset;
                adopted.push(Part::new(path.clone(), src_file_size, part.offset, remainder));
            }
        }
    }
    sort_parts(&mut adopted);
    adopted
}

/// Length of the contiguous byte range present from offset 0.
fn covered_prefix(parts: &[Part]) -> u64 {
    let file_size = parts.first().map_or(0, |p| p.file_size);
    let mut covered = 0;
    for part in parts {
        if part.offset != covered {
            break;
        }
        covered += part.actual_size.min(part.size);
        if part.is_broken() {
            break;
        }
    }
    covered.min(file_size)
}
