//! Restore orchestrator scenarios

use std::sync::Arc;

use tempfile::TempDir;

use partsync_core::config::ConfigBuilder;
use partsync_core::domain::names::{
    BACKUP_COMPLETE_FILENAME, LOCK_FILENAME, RESTORE_IN_PROGRESS_FILENAME,
};
use partsync_core::domain::{CoverageError, Part};
use partsync_core::ports::{IRemoteFs, ISnapshotFs};
use partsync_engine::{EngineError, Restore};
use partsync_fs::{LocalSnapshot, MemoryRemote, MemoryStore};

use crate::common::{self, ScriptedSnapshot};

/// A complete backup holding one 250-byte file split every 100 bytes
async fn backup_of_one_file() -> (Arc<MemoryRemote>, Vec<u8>, Vec<Part>) {
    let src = Arc::new(MemoryRemote::new(MemoryStore::new(), "backup"));
    let data = common::file_bytes(7, 250);
    let parts = common::put_file(src.as_ref(), "f", &data, 100).await;
    src.create_file(BACKUP_COMPLETE_FILENAME, b"").await.unwrap();
    (src, data, parts)
}

fn engine_error(err: &anyhow::Error) -> Option<&EngineError> {
    err.chain().find_map(|e| e.downcast_ref::<EngineError>())
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn test_resume_downloads_only_missing_parts() {
    let (src, _, parts) = backup_of_one_file().await;
    let dst = Arc::new(ScriptedSnapshot::new(vec![Part::new("f", 250, 0, 100)]));

    let dst_snapshot: Arc<dyn ISnapshotFs> = dst.clone();
    let result = Restore::new(src, dst_snapshot, &common::config(4))
        .run()
        .await
        .expect("Restore failed");

    assert_eq!(dst.written(), parts[1..].to_vec());
    assert!(dst.deleted().is_empty());
    assert_eq!(result.downloaded_bytes, 150);
    assert_eq!(result.deleted_bytes, 0);
    assert!(dst.markers().is_empty());
}

#[tokio::test]
async fn test_interrupted_local_file_is_completed() {
    let (src, data, _) = backup_of_one_file().await;
    let dir = TempDir::new().unwrap();
    // 150 bytes landed before the previous restore stopped
    common::write_file(dir.path(), "f", &data[..150]).await;

    let dst: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(dir.path()));
    let result = Restore::new(src, dst, &common::config(2)).run().await.unwrap();

    assert_eq!(result.deleted_bytes, 0);
    assert_eq!(result.downloaded_bytes, 150);
    assert_eq!(tokio::fs::read(dir.path().join("f")).await.unwrap(), data);
}

#[tokio::test]
async fn test_stale_and_oversized_files_are_replaced() {
    let (src, _, parts) = backup_of_one_file().await;
    let dst = Arc::new(ScriptedSnapshot::new(vec![
        Part::new("f", 300, 0, 300),
        Part::new("stale/old", 9, 0, 9),
    ]));

    let dst_snapshot: Arc<dyn ISnapshotFs> = dst.clone();
    Restore::new(src, dst_snapshot, &common::config(1))
        .run()
        .await
        .unwrap();

    assert_eq!(dst.deleted(), vec!["f".to_string(), "stale/old".to_string()]);
    assert_eq!(dst.written(), parts);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_missing_completion_marker_is_refused() {
    let (src, _, _) = backup_of_one_file().await;
    src.delete_file(BACKUP_COMPLETE_FILENAME).await.unwrap();
    let dir = TempDir::new().unwrap();

    let dst: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(dir.path()));
    let err = Restore::new(src.clone(), dst, &common::config(1))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        engine_error(&err),
        Some(EngineError::BackupIncomplete { .. })
    ));
    assert!(!dir.path().join("f").exists());
    assert!(dir.path().join(RESTORE_IN_PROGRESS_FILENAME).exists());
    assert!(!dir.path().join(LOCK_FILENAME).exists());

    let config = ConfigBuilder::new().skip_backup_complete_check(true).build();
    let dst: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(dir.path()));
    Restore::new(src, dst, &config).run().await.unwrap();
    assert!(dir.path().join("f").exists());
    assert!(!dir.path().join(RESTORE_IN_PROGRESS_FILENAME).exists());
}

#[tokio::test]
async fn test_gap_in_backup_is_refused() {
    let src = Arc::new(MemoryRemote::new(MemoryStore::new(), "backup"));
    common::put_part(src.as_ref(), &Part::new("f", 200, 0, 100), &[1; 100]).await;
    common::put_part(src.as_ref(), &Part::new("f", 200, 150, 50), &[2; 50]).await;
    src.create_file(BACKUP_COMPLETE_FILENAME, b"").await.unwrap();
    let dst = Arc::new(ScriptedSnapshot::new(Vec::new()));

    let dst_snapshot: Arc<dyn ISnapshotFs> = dst.clone();
    let err = Restore::new(src, dst_snapshot, &common::config(1))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        engine_error(&err),
        Some(EngineError::Coverage(CoverageError::GapBetweenParts { .. }))
    ));
    assert!(dst.written().is_empty());
    assert!(dst.markers().contains(RESTORE_IN_PROGRESS_FILENAME));
}

#[tokio::test]
async fn test_broken_part_is_refused() {
    let store = MemoryStore::new();
    let src = Arc::new(MemoryRemote::new(store.clone(), "backup"));
    let part = Part::new("f", 10, 0, 10);
    store.put(part.remote_path("backup"), vec![0; 4]);
    src.create_file(BACKUP_COMPLETE_FILENAME, b"").await.unwrap();

    let dst: Arc<dyn ISnapshotFs> = Arc::new(ScriptedSnapshot::new(Vec::new()));
    let err = Restore::new(src, dst, &common::config(1))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        engine_error(&err),
        Some(EngineError::Coverage(CoverageError::WrongPartSize { .. }))
    ));
}

// ============================================================================
// Locking
// ============================================================================

#[tokio::test]
async fn test_locked_destination_is_refused() {
    let (src, _, _) = backup_of_one_file().await;
    let dir = TempDir::new().unwrap();
    let holder = LocalSnapshot::new(dir.path());
    let _lock = holder.lock().await.unwrap();

    let dst: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(dir.path()));
    let err = Restore::new(src, dst, &common::config(1))
        .run()
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("locked"));
    assert!(!dir.path().join("f").exists());
}

#[tokio::test]
async fn test_restore_into_missing_directory() {
    let (src, data, _) = backup_of_one_file().await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("new/snapshot");

    let dst: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(&target));
    let remote: Arc<dyn IRemoteFs> = src;
    Restore::new(remote, dst, &common::config(3)).run().await.unwrap();

    assert_eq!(tokio::fs::read(target.join("f")).await.unwrap(), data);
    assert!(!target.join(LOCK_FILENAME).exists());
}
