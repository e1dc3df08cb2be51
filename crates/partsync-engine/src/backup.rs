//! Backup orchestrator
//!
//! Computes and executes a one-way sync from a local snapshot to a remote
//! destination, optionally accelerated by an origin backend that already
//! holds some of the needed parts.
//!
//! ## Backup Flow
//!
//! 1. List the source parts; a missing source fails here, before any
//!    change to the destination
//! 2. Delete the destination's completion marker, list destination and origin
//! 3. Delete `difference(dst, src)` from the destination, prune empty dirs
//! 4. Server-side copy `intersect(origin, to_add)` from the origin
//! 5. Upload `difference(to_add, origin)` from the source
//! 6. Write the backup metadata, then the completion marker
//!
//! Any failure aborts the run with the marker absent; running again
//! re-derives the remaining work from fresh listings.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use partsync_core::config::Config;
use partsync_core::domain::names::{BACKUP_COMPLETE_FILENAME, BACKUP_METADATA_FILENAME};
use partsync_core::domain::{difference, intersect, parts_size, BackupMetadata, Part};
use partsync_core::ports::{IOriginFs, IRemoteFs, ISnapshotFs};

use crate::counter::{progress_line, ByteCounter, CountingReader};
use crate::pool::run_parallel;
use crate::transfer::{copy_remote_parts, delete_remote_parts, CopySource};
use crate::EngineError;

// ============================================================================
// BackupResult
// ============================================================================

/// Summary of a completed backup
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupResult {
    /// Total size of the source snapshot
    pub backup_size: u64,
    /// Bytes deleted from the destination
    pub deleted_bytes: u64,
    /// Bytes server-side copied from the origin
    pub copied_bytes: u64,
    /// Bytes uploaded from the source
    pub uploaded_bytes: u64,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

// ============================================================================
// Backup
// ============================================================================

/// One-way sync from a local snapshot to a remote backend
pub struct Backup {
    src: Arc<dyn ISnapshotFs>,
    dst: Arc<dyn IRemoteFs>,
    origin: Arc<dyn IOriginFs>,
    concurrency: usize,
}

impl Backup {
    /// Creates a backup run
    ///
    /// Pass an empty origin when no origin is configured. Bandwidth limiting
    /// is a property of `src`.
    pub fn new(
        src: Arc<dyn ISnapshotFs>,
        dst: Arc<dyn IRemoteFs>,
        origin: Arc<dyn IOriginFs>,
        config: &Config,
    ) -> Self {
        Self {
            src,
            dst,
            origin,
            concurrency: config.effective_concurrency(),
        }
    }

    /// Executes the backup
    #[tracing::instrument(skip(self), fields(src = %self.src, dst = %self.dst, origin = %self.origin))]
    pub async fn run(&self) -> Result<BackupResult> {
        let started = Instant::now();
        let created_at = Utc::now();
        info!("Starting backup");

        // an unreadable src must fail before the destination is touched
        let src_parts = self
            .src
            .list_parts()
            .await
            .with_context(|| format!("cannot list src parts at {}", self.src))?;
        info!(parts = src_parts.len(), "Obtained src parts");

        self.dst
            .delete_file(BACKUP_COMPLETE_FILENAME)
            .await
            .with_context(|| {
                format!("cannot delete {BACKUP_COMPLETE_FILENAME} at {}", self.dst)
            })?;
        let dst_parts = self
            .dst
            .list_parts()
            .await
            .with_context(|| format!("cannot list dst parts at {}", self.dst))?;
        info!(parts = dst_parts.len(), "Obtained dst parts");
        let origin_parts = self
            .origin
            .list_parts()
            .await
            .with_context(|| format!("cannot list origin parts at {}", self.origin))?;
        info!(parts = origin_parts.len(), "Obtained origin parts");

        let backup_size = parts_size(&src_parts);

        let to_delete = difference(&dst_parts, &src_parts);
        let deleted_bytes = delete_remote_parts(&self.dst, to_delete, self.concurrency).await?;

        let to_add = difference(&src_parts, &dst_parts);
        let to_copy = intersect(&origin_parts, &to_add);
        let to_upload = difference(&to_add, &origin_parts);
        debug!(
            to_copy = to_copy.len(),
            to_upload = to_upload.len(),
            "Split parts to add"
        );

        let copied_bytes = copy_remote_parts(
            &self.dst,
            CopySource::Origin(self.origin.clone()),
            to_copy,
            self.concurrency,
        )
        .await?;
        let uploaded_bytes = self.upload_parts(to_upload).await?;

        let metadata = BackupMetadata::completed_now(created_at);
        let metadata = metadata.to_bytes().context("cannot serialize backup metadata")?;
        self.dst
            .create_file(BACKUP_METADATA_FILENAME, &metadata)
            .await
            .with_context(|| {
                format!("cannot store {BACKUP_METADATA_FILENAME} at {}", self.dst)
            })?;
        self.dst
            .create_file(BACKUP_COMPLETE_FILENAME, &[])
            .await
            .with_context(|| {
                format!("cannot create {BACKUP_COMPLETE_FILENAME} at {}", self.dst)
            })?;

        let result = BackupResult {
            backup_size,
            deleted_bytes,
            copied_bytes,
            uploaded_bytes,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            backup_size = result.backup_size,
            deleted_bytes = result.deleted_bytes,
            copied_bytes = result.copied_bytes,
            uploaded_bytes = result.uploaded_bytes,
            duration_ms = result.duration_ms,
            "Backup complete"
        );
        Ok(result)
    }

    async fn upload_parts(&self, parts: Vec<Part>) -> Result<u64> {
        if parts.is_empty() {
            return Ok(0);
        }
        let total = parts_size(&parts);
        let uploaded = ByteCounter::new();
        info!(parts = parts.len(), bytes = total, "Uploading parts");

        let src = self.src.clone();
        let dst = self.dst.clone();
        let worker_uploaded = uploaded.clone();
        run_parallel(
            self.concurrency,
            parts,
            move |part| {
                let src = src.clone();
                let dst = dst.clone();
                let uploaded = worker_uploaded.clone();
                async move {
                    debug!(%part, "Uploading part");
                    let reader = src
                        .open_part_reader(&part)
                        .await
                        .with_context(|| format!("cannot open {part} at {src}"))?;
                    let mut reader = CountingReader::new(reader, uploaded);
                    dst.upload_part(&part, &mut reader)
                        .await
                        .with_context(|| format!("cannot upload {part} to {dst}"))?;
                    if reader.count() != part.size {
                        return Err(EngineError::ShortTransfer {
                            got: reader.count(),
                            want: part.size,
                            part,
                        }
                        .into());
                    }
                    Ok(())
                }
            },
            |elapsed| {
                info!(
                    "{}",
                    progress_line("uploaded", uploaded.get(), total, &self.src, &self.dst, elapsed)
                )
            },
        )
        .await?;
        Ok(uploaded.get())
    }
}
