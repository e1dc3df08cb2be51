//! Copy command - Replicate a backup between two remotes server-side

use anyhow::Result;
use clap::Args;
use tracing::info;

use partsync_core::config::Config;
use partsync_engine::RemoteCopy;
use partsync_fs::new_remote_fs;

use crate::output::{print_summary, OutputFormat};

#[derive(Debug, Args)]
pub struct CopyCommand {
    /// Source backup URI
    #[arg(long)]
    pub src: String,

    /// Destination URI
    #[arg(long)]
    pub dst: String,
}

impl CopyCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let src = new_remote_fs(&self.src)?;
        let dst = new_remote_fs(&self.dst)?;

        info!(src = %self.src, dst = %self.dst, "Running remote copy");
        let result = RemoteCopy::new(src, dst, config).run().await?;

        print_summary(
            format,
            &format!("Copied {} to {}", self.src, self.dst),
            &[
                ("Deleted", result.deleted_bytes),
                ("Server-side copied", result.copied_bytes),
            ],
            &result,
            result.duration_ms,
        )
    }
}
