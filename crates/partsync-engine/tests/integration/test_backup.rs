//! Backup orchestrator scenarios

use std::collections::BTreeSet;
use std::sync::Arc;

use partsync_core::domain::names::{BACKUP_COMPLETE_FILENAME, BACKUP_METADATA_FILENAME};
use partsync_core::domain::{BackupMetadata, Part};
use partsync_core::ports::{IOriginFs, IRemoteFs, ISnapshotFs};
use partsync_engine::Backup;
use partsync_fs::{EmptyOrigin, LocalSnapshot, MemoryRemote, MemoryStore};

use crate::common::{self, Call, Dirs, RecordingRemote};

fn paths<'a>(calls: &'a [Call], pick: impl Fn(&'a Call) -> Option<&'a Part>) -> BTreeSet<&'a str> {
    calls.iter().filter_map(pick).map(|p| p.path.as_str()).collect()
}

// ============================================================================
// Origin acceleration
// ============================================================================

#[tokio::test]
async fn test_origin_parts_are_copied_not_uploaded() {
    let dirs = Dirs::new();
    let a = common::file_bytes(1, 40);
    let b = common::file_bytes(2, 50);
    let c = common::file_bytes(3, 60);
    common::write_file(dirs.src.path(), "a", &a).await;
    common::write_file(dirs.src.path(), "b", &b).await;
    common::write_file(dirs.src.path(), "c", &c).await;

    let store = MemoryStore::new();
    let origin = MemoryRemote::new(store.clone(), "origin");
    common::put_file(&origin, "a", &a, u64::MAX).await;
    common::put_file(&origin, "c", &c, u64::MAX).await;
    let dst = Arc::new(RecordingRemote::new(store.clone(), "dst"));

    let src: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(dirs.src.path()));
    let dst_remote: Arc<dyn IRemoteFs> = dst.clone();
    let origin: Arc<dyn IOriginFs> = Arc::new(origin);
    let result = Backup::new(src, dst_remote, origin, &common::config(4))
        .run()
        .await
        .expect("Backup failed");

    let calls = dst.calls();
    let copied = paths(&calls, |c| match c {
        Call::Copy(p) => Some(p),
        _ => None,
    });
    let uploaded = paths(&calls, |c| match c {
        Call::Upload(p) => Some(p),
        _ => None,
    });
    assert_eq!(copied, BTreeSet::from(["a", "c"]));
    assert_eq!(uploaded, BTreeSet::from(["b"]));

    assert_eq!(result.backup_size, 150);
    assert_eq!(result.copied_bytes, 100);
    assert_eq!(result.uploaded_bytes, 50);
    assert_eq!(result.deleted_bytes, 0);
    assert_eq!(dst.list_parts().await.unwrap().len(), 3);
    assert!(dst.has_file(BACKUP_COMPLETE_FILENAME).await.unwrap());
}

#[tokio::test]
async fn test_backup_writes_metadata_before_marker() {
    let dirs = Dirs::new();
    common::write_file(dirs.src.path(), "x/y", b"payload").await;
    let dst = Arc::new(MemoryRemote::new(MemoryStore::new(), "dst"));

    Backup::new(
        Arc::new(LocalSnapshot::new(dirs.src.path())),
        dst.clone(),
        Arc::new(EmptyOrigin),
        &common::config(2),
    )
    .run()
    .await
    .unwrap();

    let metadata = dst.read_file(BACKUP_METADATA_FILENAME).await.unwrap();
    let metadata = BackupMetadata::from_bytes(&metadata).unwrap();
    assert!(metadata.completed_at >= metadata.created_at);
    assert!(dst.has_file(BACKUP_COMPLETE_FILENAME).await.unwrap());
}

// ============================================================================
// Incremental runs
// ============================================================================

#[tokio::test]
async fn test_second_backup_transfers_nothing() {
    let dirs = Dirs::new();
    common::write_file(dirs.src.path(), "data", &common::file_bytes(9, 500)).await;
    let src: Arc<dyn ISnapshotFs> =
        Arc::new(LocalSnapshot::new(dirs.src.path()).with_max_part_size(128));
    let dst: Arc<dyn IRemoteFs> = Arc::new(MemoryRemote::new(MemoryStore::new(), "dst"));
    let first = common::run_backup(&src, &dst, 3).await.unwrap();
    assert_eq!(first.uploaded_bytes, 500);

    let second = common::run_backup(&src, &dst, 3).await.unwrap();
    assert_eq!(second.backup_size, 500);
    assert_eq!(second.uploaded_bytes, 0);
    assert_eq!(second.copied_bytes, 0);
    assert_eq!(second.deleted_bytes, 0);
}

#[tokio::test]
async fn test_grown_file_replaces_its_parts() {
    let dirs = Dirs::new();
    let data = common::file_bytes(4, 300);
    common::write_file(dirs.src.path(), "log", &data[..200]).await;
    let src: Arc<dyn ISnapshotFs> =
        Arc::new(LocalSnapshot::new(dirs.src.path()).with_max_part_size(100));
    let dst: Arc<dyn IRemoteFs> = Arc::new(MemoryRemote::new(MemoryStore::new(), "dst"));
    common::run_backup(&src, &dst, 2).await.unwrap();

    common::write_file(dirs.src.path(), "log", &data).await;
    let result = common::run_backup(&src, &dst, 2).await.unwrap();

    // the file size is part of every part's identity
    assert_eq!(result.deleted_bytes, 200);
    assert_eq!(result.uploaded_bytes, 300);
    let parts = dst.list_parts().await.unwrap();
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| p.file_size == 300));
}

// ============================================================================
// Fail-fast
// ============================================================================

#[tokio::test]
async fn test_failed_delete_stops_new_work_and_leaves_no_marker() {
    let dirs = Dirs::new();
    let store = MemoryStore::new();
    let dst = Arc::new(RecordingRemote::new(store.clone(), "dst").failing_delete_of("stale0"));
    for i in 0..10 {
        common::put_file(dst.as_ref(), &format!("stale{i}"), b"old!", u64::MAX).await;
    }
    dst.create_file(BACKUP_COMPLETE_FILENAME, b"").await.unwrap();

    let dst_remote: Arc<dyn IRemoteFs> = dst.clone();
    let err = Backup::new(
        Arc::new(LocalSnapshot::new(dirs.src.path())),
        dst_remote,
        Arc::new(EmptyOrigin),
        &common::config(4),
    )
    .run()
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("injected failure"));
    assert_eq!(dst.deletes_after_failure(), 0);
    assert!(dst.deletes_started() <= 4, "{} deletes started", dst.deletes_started());
    assert!(dst.list_parts().await.unwrap().len() >= 6);
    assert!(!dst.has_file(BACKUP_COMPLETE_FILENAME).await.unwrap());
}

#[tokio::test]
async fn test_cross_backend_origin_fails() {
    let dirs = Dirs::new();
    let origin_dir = tempfile::TempDir::new().unwrap();
    let data = common::file_bytes(5, 10);
    common::write_file(dirs.src.path(), "f", &data).await;
    let origin = partsync_fs::FsRemote::new(origin_dir.path());
    common::put_file(&origin, "f", &data, u64::MAX).await;
    let dst = Arc::new(MemoryRemote::new(MemoryStore::new(), "dst"));

    let err = Backup::new(
        Arc::new(LocalSnapshot::new(dirs.src.path())),
        dst.clone(),
        Arc::new(origin),
        &common::config(1),
    )
    .run()
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("is not supported"));
    assert!(!dst.has_file(BACKUP_COMPLETE_FILENAME).await.unwrap());
}

#[tokio::test]
async fn test_missing_src_leaves_destination_untouched() {
    let dirs = Dirs::new();
    let store = MemoryStore::new();
    let seeded = MemoryRemote::new(store.clone(), "dst");
    let kept = common::put_file(&seeded, "f", b"keep me", u64::MAX).await;
    seeded.create_file(BACKUP_COMPLETE_FILENAME, b"").await.unwrap();
    let dst = Arc::new(RecordingRemote::new(store.clone(), "dst"));

    let dst_remote: Arc<dyn IRemoteFs> = dst.clone();
    let err = Backup::new(
        Arc::new(LocalSnapshot::new(dirs.src.path().join("typo"))),
        dst_remote,
        Arc::new(EmptyOrigin),
        &common::config(2),
    )
    .run()
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("does not exist"), "{err:#}");
    assert!(dst.calls().is_empty());
    assert_eq!(dst.list_parts().await.unwrap(), kept);
    assert!(dst.has_file(BACKUP_COMPLETE_FILENAME).await.unwrap());
}
