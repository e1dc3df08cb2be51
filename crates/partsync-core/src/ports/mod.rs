//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the orchestrators
//! depend on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IOriginFs`] - Read-only backend usable as a server-side copy source
//! - [`IRemoteFs`] - Writable remote backend holding part objects
//! - [`ISnapshotFs`] - Local snapshot directory

pub mod remote_fs;
pub mod snapshot_fs;

pub use remote_fs::{BackendLocation, IOriginFs, IRemoteFs};
pub use snapshot_fs::{DirLock, ISnapshotFs, PartReader, PartWriter};
