//! partsync engine - part-based backup, remote copy and restore
//!
//! Provides:
//! - A bounded-concurrency worker pool with fail-fast abort and periodic
//!   progress reporting
//! - Byte counters shared between transfer workers and progress reporters
//! - The backup, remote-to-remote copy and restore orchestrators
//!
//! ## Modules
//!
//! - [`pool`] - `run_parallel` / `run_parallel_per_path`
//! - [`counter`] - Atomic byte counters and counting stream wrappers
//! - [`backup`] - Local snapshot to remote, optionally accelerated by an origin
//! - [`copy`] - Remote to remote via server-side copy
//! - [`restore`] - Remote to local snapshot, validated and resumable

pub mod backup;
pub mod copy;
pub mod counter;
pub mod pool;
pub mod restore;
mod transfer;

use partsync_core::domain::{CoverageError, Part};
use thiserror::Error;

pub use backup::{Backup, BackupResult};
pub use copy::{CopyResult, RemoteCopy};
pub use restore::{Restore, RestoreResult};

/// Errors raised by the orchestrators themselves
///
/// Backend failures travel as `anyhow::Error` with context; these variants
/// classify the failures the engine detects on its own.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The restore source lacks the completion marker
    #[error(
        "cannot find {marker} file in {src}; this means either incomplete backup or old backup; \
         set restore.skip_backup_complete_check to restore anyway"
    )]
    BackupIncomplete {
        /// Display name of the source backend
        src: String,
        /// Name of the missing marker
        marker: &'static str,
    },

    /// The restore source does not tile its files exactly
    #[error("invalid backup: {0}")]
    Coverage(#[from] CoverageError),

    /// A transfer moved a different number of bytes than the part holds
    #[error("unexpected number of bytes transferred for {part}; got {got} bytes; want {want} bytes")]
    ShortTransfer {
        /// The part being transferred
        part: Part,
        /// Bytes actually transferred
        got: u64,
        /// Bytes the part should hold
        want: u64,
    },

    /// The run was cancelled from outside
    #[error("interrupted")]
    Interrupted,
}
