//! Remote-to-remote copy orchestrator
//!
//! Replicates a backup between two backends of the same kind. Every missing
//! part is served by the source through server-side copy; no part bytes
//! pass through this process. The source's metadata record is copied
//! verbatim before the completion marker is written.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use partsync_core::config::Config;
use partsync_core::domain::difference;
use partsync_core::domain::names::{BACKUP_COMPLETE_FILENAME, BACKUP_METADATA_FILENAME};
use partsync_core::ports::IRemoteFs;

use crate::transfer::{copy_remote_parts, delete_remote_parts, CopySource};

/// Summary of a completed remote copy
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyResult {
    /// Bytes deleted from the destination
    pub deleted_bytes: u64,
    /// Bytes server-side copied from the source
    pub copied_bytes: u64,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

/// Server-side replication between two remote backends
pub struct RemoteCopy {
    src: Arc<dyn IRemoteFs>,
    dst: Arc<dyn IRemoteFs>,
    concurrency: usize,
}

impl RemoteCopy {
    pub fn new(src: Arc<dyn IRemoteFs>, dst: Arc<dyn IRemoteFs>, config: &Config) -> Self {
        Self {
            src,
            dst,
            concurrency: config.effective_concurrency(),
        }
    }

    /// Executes the copy
    #[tracing::instrument(skip(self), fields(src = %self.src, dst = %self.dst))]
    pub async fn run(&self) -> Result<CopyResult> {
        let started = Instant::now();
        info!("Starting remote copy");

        self.dst
            .delete_file(BACKUP_COMPLETE_FILENAME)
            .await
            .with_context(|| {
                format!("cannot delete {BACKUP_COMPLETE_FILENAME} at {}", self.dst)
            })?;

        let src_parts = self
            .src
            .list_parts()
            .await
            .with_context(|| format!("cannot list src parts at {}", self.src))?;
        info!(parts = src_parts.len(), "Obtained src parts");
        let dst_parts = self
            .dst
            .list_parts()
            .await
            .with_context(|| format!("cannot list dst parts at {}", self.dst))?;
        info!(parts = dst_parts.len(), "Obtained dst parts");

        let to_delete = difference(&dst_parts, &src_parts);
        let deleted_bytes = delete_remote_parts(&self.dst, to_delete, self.concurrency).await?;

        let to_copy = difference(&src_parts, &dst_parts);
        let copied_bytes = copy_remote_parts(
            &self.dst,
            CopySource::Remote(self.src.clone()),
            to_copy,
            self.concurrency,
        )
        .await?;

        let metadata = self
            .src
            .read_file(BACKUP_METADATA_FILENAME)
            .await
            .with_context(|| {
                format!("cannot read {BACKUP_METADATA_FILENAME} from {}", self.src)
            })?;
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

        let result = CopyResult {
            deleted_bytes,
            copied_bytes,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            deleted_bytes = result.deleted_bytes,
            copied_bytes = result.copied_bytes,
            duration_ms = result.duration_ms,
            "Remote copy complete"
        );
        Ok(result)
    }
}
