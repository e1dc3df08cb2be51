//! Backup command - Sync a local snapshot to a remote backend
//!
//! Provides the `partsync backup` CLI command which:
//! 1. Builds the local snapshot (bandwidth-limited when configured)
//! 2. Builds the destination and optional origin from their URIs
//! 3. Runs the backup and prints the summary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use partsync_core::config::Config;
use partsync_engine::Backup;
use partsync_fs::{new_origin_fs, new_remote_fs, FsError, LocalSnapshot};

use crate::output::{print_summary, OutputFormat};

#[derive(Debug, Args)]
pub struct BackupCommand {
    /// Local snapshot directory to back up
    #[arg(long)]
    pub src: PathBuf,

    /// Destination URI, e.g. fs:///var/backups/daily
    #[arg(long)]
    pub dst: String,

    /// Remote already holding parts of this snapshot, copied server-side
    #[arg(long)]
    pub origin: Option<String>,
}

impl BackupCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        if !self.src.is_dir() {
            return Err(FsError::MissingRoot(self.src.clone()).into());
        }
        let dst = new_remote_fs(&self.dst)?;
        let origin = new_origin_fs(self.origin.as_deref())?;
        let src = Arc::new(LocalSnapshot::from_config(&self.src, config));

        info!(src = %self.src.display(), dst = %self.dst, "Running backup");
        let result = Backup::new(src, dst, origin, config).run().await?;

        print_summary(
            format,
            &format!("Backed up {} to {}", self.src.display(), self.dst),
            &[
                ("Backup size", result.backup_size),
                ("Deleted", result.deleted_bytes),
                ("Server-side copied", result.copied_bytes),
                ("Uploaded", result.uploaded_bytes),
            ],
            &result,
            result.duration_ms,
        )
    }
}
