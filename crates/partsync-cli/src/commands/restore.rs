//! Restore command - Sync a remote backup into a local directory

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use partsync_core::config::{Config, ConfigBuilder};
use partsync_engine::Restore;
use partsync_fs::{new_remote_fs, LocalSnapshot};

use crate::output::{print_summary, OutputFormat};

#[derive(Debug, Args)]
pub struct RestoreCommand {
    /// Backup URI to restore from
    #[arg(long)]
    pub src: String,

    /// Local directory to restore into; created if missing
    #[arg(long)]
    pub dst: PathBuf,

    /// Restore even if the backup has no completion marker
    #[arg(long)]
    pub skip_backup_complete_check: bool,
}

impl RestoreCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let config = if self.skip_backup_complete_check {
            ConfigBuilder::from_config(config.clone())
                .skip_backup_complete_check(true)
                .build()
        } else {
            config.clone()
        };

        let src = new_remote_fs(&self.src)?;
        let dst = Arc::new(LocalSnapshot::from_config(&self.dst, &config));

        info!(src = %self.src, dst = %self.dst.display(), "Running restore");
        let result = Restore::new(src, dst, &config).run().await?;

        print_summary(
            format,
            &format!("Restored {} to {}", self.src, self.dst.display()),
            &[
                ("Deleted", result.deleted_bytes),
                ("Downloaded", result.downloaded_bytes),
            ],
            &result,
            result.duration_ms,
        )
    }
}
