//! Storage URI parsing and backend construction
//!
//! Remote backends are addressed by URIs of the form `scheme://location`.
//! Only `fs://` (an absolute directory) is handled by this crate; any other
//! scheme is rejected before any I/O happens.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use partsync_core::domain::DomainError;
use partsync_core::ports::{IOriginFs, IRemoteFs};

use crate::empty::EmptyOrigin;
use crate::remote::FsRemote;
use crate::FsError;

const FS_SCHEME: &str = "fs";

/// A parsed remote storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    /// `fs:///absolute/dir`
    Filesystem(PathBuf),
}

impl FromStr for StorageUri {
    type Err = anyhow::Error;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let Some((scheme, location)) = uri.split_once("://") else {
            return Err(FsError::UnsupportedScheme {
                scheme: String::new(),
                uri: uri.to_string(),
            }
            .into());
        };
        if scheme != FS_SCHEME {
            return Err(FsError::UnsupportedScheme {
                scheme: scheme.to_string(),
                uri: uri.to_string(),
            }
            .into());
        }

        let dir = PathBuf::from(location);
        if !dir.is_absolute() {
            return Err(DomainError::InvalidStorageUri(format!(
                "{uri} (the fs:// path must be absolute)"
            ))
            .into());
        }
        Ok(StorageUri::Filesystem(dir))
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageUri::Filesystem(dir) => write!(f, "{FS_SCHEME}://{}", dir.display()),
        }
    }
}

/// Builds the remote backend addressed by `uri`
pub fn new_remote_fs(uri: &str) -> anyhow::Result<Arc<dyn IRemoteFs>> {
    match uri.parse::<StorageUri>()? {
        StorageUri::Filesystem(dir) => Ok(Arc::new(FsRemote::new(dir))),
    }
}

/// Builds the origin addressed by `uri`; no URI means an empty origin
pub fn new_origin_fs(uri: Option<&str>) -> anyhow::Result<Arc<dyn IOriginFs>> {
    match uri.map(str::trim) {
        None | Some("") => Ok(Arc::new(EmptyOrigin)),
        Some(uri) => match uri.parse::<StorageUri>()? {
            StorageUri::Filesystem(dir) => Ok(Arc::new(FsRemote::new(dir))),
        },
    }
}
