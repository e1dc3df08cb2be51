//! Shared helpers for storage adapter integration tests

use std::sync::Arc;

use tempfile::TempDir;

use partsync_core::domain::Part;
use partsync_core::ports::IRemoteFs;
use partsync_fs::{FsRemote, MemoryRemote, MemoryStore};

/// A remote under test plus whatever keeps its storage alive
pub struct Backend {
    pub name: &'static str,
    pub remote: Arc<dyn IRemoteFs>,
    _dir: Option<TempDir>,
}

/// Returns one fresh, empty instance of every remote backend
pub fn all_backends() -> Vec<Backend> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let fs_remote = FsRemote::new(dir.path().join("remote"));
    vec![
        Backend {
            name: "fs",
            remote: Arc::new(fs_remote),
            _dir: Some(dir),
        },
        Backend {
            name: "memory",
            remote: Arc::new(MemoryRemote::new(MemoryStore::new(), "backups/remote")),
            _dir: None,
        },
    ]
}

/// Deterministic content for a part
pub fn part_bytes(part: &Part) -> Vec<u8> {
    (part.offset..part.end()).map(|i| (i % 251) as u8).collect()
}

/// Uploads `part` with content from [`part_bytes`]
pub async fn upload(remote: &dyn IRemoteFs, part: &Part) {
    let data = part_bytes(part);
    let mut source = &data[..];
    remote
        .upload_part(part, &mut source)
        .await
        .expect("Upload failed");
}
