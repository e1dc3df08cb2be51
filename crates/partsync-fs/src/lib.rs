//! partsync storage adapters
//!
//! Provides implementations of the `partsync-core` ports:
//! - A local snapshot directory (`ISnapshotFs`)
//! - A filesystem remote addressed by `fs://` URIs (`IRemoteFs`)
//! - An in-memory remote for tests and embedding (`IRemoteFs`)
//! - An empty origin used when no origin is configured (`IOriginFs`)
//!
//! ## Modules
//!
//! - [`bandwidth`] - Sliding-window bandwidth limiter and limited streams
//! - [`local`] - Local snapshot directory
//! - [`remote`] - `fs://` remote backend
//! - [`memory`] - In-memory remote backend
//! - [`empty`] - Origin that holds nothing
//! - [`uri`] - Storage URI parsing and backend construction

pub mod bandwidth;
pub mod empty;
pub mod local;
pub mod memory;
pub mod remote;
pub mod uri;

use std::path::PathBuf;

use thiserror::Error;

pub use bandwidth::{BandwidthLimiter, LimitedReader, LimitedWriter};
pub use empty::EmptyOrigin;
pub use local::LocalSnapshot;
pub use memory::{MemoryRemote, MemoryStore};
pub use remote::FsRemote;
pub use uri::{new_origin_fs, new_remote_fs, StorageUri};

/// Errors raised by the storage adapters
#[derive(Debug, Error)]
pub enum FsError {
    /// A storage URI with a scheme no adapter handles
    #[error("unsupported scheme {scheme:?} in {uri:?}; supported schemes: fs://")]
    UnsupportedScheme {
        /// The scheme found in the URI
        scheme: String,
        /// The full URI
        uri: String,
    },

    /// Server-side copy requested between different kinds of backends
    #[error("server-side copy from {src} backend to {dst} backend is not supported")]
    CrossBackendCopy {
        /// Kind of the source backend
        src: &'static str,
        /// Kind of the destination backend
        dst: &'static str,
    },

    /// An object or stream holds a different number of bytes than expected
    #[error("unexpected size for {what}: got {got} bytes; want {want} bytes")]
    SizeMismatch {
        /// The object or part concerned
        what: String,
        /// Observed size
        got: u64,
        /// Expected size
        want: u64,
    },

    /// The snapshot directory to read from does not exist
    #[error("snapshot directory {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),

    /// Another holder has the snapshot lock
    #[error("{0} is locked by another process")]
    Locked(PathBuf),

    /// An I/O error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
