//! Remote storage ports (driven/secondary ports)
//!
//! This module defines the capability interface every storage backend must
//! satisfy. Orchestrators only ever talk to backends through these traits.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because backend errors are adapter-specific.
//! - [`IOriginFs`] is the read-only subset needed to act as a copy source
//!   (an origin snapshot, or the source of a remote copy).
//! - Server-side copy is only possible between backends of the same kind.
//!   Each backend exposes a [`BackendLocation`] so the destination can check
//!   the source's kind with a plain `match` and refuse anything else.

use std::fmt::Display;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::part::Part;

// ============================================================================
// BackendLocation
// ============================================================================

/// Where a backend keeps its objects
///
/// Used to decide whether a server-side copy between two backends is
/// possible and how to address the source objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendLocation {
    /// A directory on a locally mounted filesystem
    Filesystem {
        /// Absolute directory holding the part objects
        dir: PathBuf,
    },
    /// A prefix inside an in-process object store
    Memory {
        /// Identity of the shared store
        store_id: u64,
        /// Key prefix inside the store
        dir: String,
    },
    /// A backend that holds nothing
    Empty,
}

impl BackendLocation {
    /// Short name of the backend kind, for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            BackendLocation::Filesystem { .. } => "fs",
            BackendLocation::Memory { .. } => "memory",
            BackendLocation::Empty => "empty",
        }
    }
}

// ============================================================================
// IOriginFs trait
// ============================================================================

/// Read-only view of a backend that can serve server-side copies
///
/// `Display` must yield a human readable identity such as `fs:///backups/x`.
#[async_trait::async_trait]
pub trait IOriginFs: Display + Send + Sync {
    /// Returns where this backend keeps its objects
    fn location(&self) -> BackendLocation;

    /// Enumerates every part stored below the backend root
    ///
    /// Objects whose names do not follow the part naming scheme are skipped,
    /// as are names ending in `.ignore`. `actual_size` of each returned part
    /// is the stored object size.
    async fn list_parts(&self) -> anyhow::Result<Vec<Part>>;
}

// ============================================================================
// IRemoteFs trait
// ============================================================================

/// Port trait for a writable remote backend
///
/// ## Implementation Notes
///
/// - `download_part` and `upload_part` must fail when the number of bytes
///   transferred differs from `part.size`.
/// - `delete_file` is idempotent: deleting an absent file is not an error.
/// - `create_file` overwrites any existing file.
/// - `remove_empty_dirs` is a no-op for flat object stores.
#[async_trait::async_trait]
pub trait IRemoteFs: IOriginFs {
    /// Returns this backend as a copy source
    fn as_origin(&self) -> &dyn IOriginFs;

    /// Deletes the object holding `part`
    async fn delete_part(&self, part: &Part) -> anyhow::Result<()>;

    /// Removes directories left empty by deletions
    async fn remove_empty_dirs(&self) -> anyhow::Result<()>;

    /// Copies `part` from `src` without routing the bytes through this process
    ///
    /// # Errors
    /// Fails when `src` is not the same kind of backend as `self`.
    async fn copy_part(&self, src: &dyn IOriginFs, part: &Part) -> anyhow::Result<()>;

    /// Streams the bytes of `part` into `sink`
    async fn download_part(
        &self,
        part: &Part,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> anyhow::Result<()>;

    /// Stores the bytes read from `source` as `part`
    async fn upload_part(
        &self,
        part: &Part,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> anyhow::Result<()>;

    /// Deletes the auxiliary file `name` if it exists
    async fn delete_file(&self, name: &str) -> anyhow::Result<()>;

    /// Creates or replaces the auxiliary file `name`
    async fn create_file(&self, name: &str, data: &[u8]) -> anyhow::Result<()>;

    /// Returns true if the auxiliary file `name` exists
    async fn has_file(&self, name: &str) -> anyhow::Result<bool>;

    /// Reads the auxiliary file `name`
    async fn read_file(&self, name: &str) -> anyhow::Result<Vec<u8>>;
}
