//! Local snapshot port (driven/secondary port)
//!
//! A snapshot is a directory on the local filesystem: the source of a
//! backup and the destination of a restore.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//! - Part readers and writers are boxed tokio streams so adapters can wrap
//!   them (bandwidth limiting, byte counting) without changing the port.
//! - `DirLock` is an RAII guard: dropping it releases the lock.

use std::fmt::Display;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::part::Part;

/// Stream of the bytes of one part
pub type PartReader = Box<dyn AsyncRead + Send + Unpin>;

/// Sink for the bytes of one part
///
/// `shutdown` must be called once all bytes are written; it fails when the
/// number of bytes written differs from the part size.
pub type PartWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ============================================================================
// DirLock
// ============================================================================

/// RAII handle for an exclusive lock on a snapshot directory
///
/// When this handle is dropped the lock is released, including on error
/// paths and panics.
///
/// ## Usage
///
/// ```ignore
/// let lock = snapshot.lock().await?;
/// // ... directory is exclusively ours ...
/// drop(lock); // lock is released
/// ```
pub struct DirLock {
    release_fn: Option<Box<dyn FnOnce() + Send>>,
}

impl DirLock {
    /// Creates a new DirLock with the given release callback
    ///
    /// The callback will be invoked exactly once.
    pub fn new(release_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release_fn: Some(Box::new(release_fn)),
        }
    }

    /// Explicitly releases the lock, consuming the handle
    pub fn release(mut self) {
        if let Some(release_fn) = self.release_fn.take() {
            release_fn();
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Some(release_fn) = self.release_fn.take() {
            release_fn();
        }
    }
}

impl std::fmt::Debug for DirLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirLock")
            .field("held", &self.release_fn.is_some())
            .finish()
    }
}

// ============================================================================
// ISnapshotFs trait
// ============================================================================

/// Port trait for a local snapshot directory
///
/// ## Implementation Notes
///
/// - Part paths are canonical `/`-separated paths relative to `root()`.
/// - Files larger than [`MAX_PART_SIZE`](crate::domain::MAX_PART_SIZE) are
///   listed as several consecutive parts.
/// - Marker and lock files are never listed as parts.
#[async_trait::async_trait]
pub trait ISnapshotFs: Display + Send + Sync {
    /// Root directory of the snapshot
    fn root(&self) -> &Path;

    /// Enumerates the parts of every regular file below the root
    async fn list_parts(&self) -> anyhow::Result<Vec<Part>>;

    /// Opens a reader over exactly the bytes of `part`
    async fn open_part_reader(&self, part: &Part) -> anyhow::Result<PartReader>;

    /// Opens a writer that stores `part` at its offset
    ///
    /// Parent directories are created. Existing bytes before the part's
    /// offset are kept.
    async fn open_part_writer(&self, part: &Part) -> anyhow::Result<PartWriter>;

    /// Deletes the file at `path`, returning its size
    ///
    /// Deleting an absent file returns 0.
    async fn delete_path(&self, path: &str) -> anyhow::Result<u64>;

    /// Removes empty directories below the root, never the root itself
    async fn remove_empty_dirs(&self) -> anyhow::Result<()>;

    /// Takes an exclusive lock on the snapshot, creating the root if needed
    ///
    /// # Errors
    /// Fails immediately when another holder has the lock.
    async fn lock(&self) -> anyhow::Result<DirLock>;

    /// Creates an empty marker file `name` in the root
    async fn create_marker(&self, name: &str) -> anyhow::Result<()>;

    /// Removes the marker file `name` from the root if present
    async fn remove_marker(&self, name: &str) -> anyhow::Result<()>;
}
