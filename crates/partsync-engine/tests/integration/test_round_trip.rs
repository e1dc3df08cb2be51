//! Backup then restore through real directories

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use partsync_core::domain::names::BACKUP_COMPLETE_FILENAME;
use partsync_core::ports::{IRemoteFs, ISnapshotFs};
use partsync_engine::Restore;
use partsync_fs::{new_remote_fs, LocalSnapshot};

use crate::common::{self, Dirs};

async fn assert_same_file(a: &Path, b: &Path, name: &str) {
    let left = tokio::fs::read(a.join(name)).await.unwrap();
    let right = tokio::fs::read(b.join(name)).await.unwrap();
    assert_eq!(left, right, "{name} differs");
}

async fn restore(src: &Arc<dyn IRemoteFs>, dst: &Path) -> partsync_engine::RestoreResult {
    let snapshot: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(dst).with_max_part_size(64));
    Restore::new(src.clone(), snapshot, &common::config(4))
        .run()
        .await
        .expect("Restore failed")
}

#[tokio::test]
async fn test_backup_restore_through_fs_remote() {
    let dirs = Dirs::new();
    let remote_dir = TempDir::new().unwrap();
    let src = dirs.src_path();
    let dst = dirs.dst_path();

    common::write_file(&src, "db/part-1/data.bin", &common::file_bytes(1, 1000)).await;
    common::write_file(&src, "db/part-1/index.bin", &common::file_bytes(2, 64)).await;
    common::write_file(&src, "db/part-2/data.bin", &common::file_bytes(3, 130)).await;
    common::write_file(&src, "db/empty.flag", b"").await;

    let uri = format!("fs://{}", remote_dir.path().display());
    let remote = new_remote_fs(&uri).unwrap();
    let snapshot: Arc<dyn ISnapshotFs> = Arc::new(LocalSnapshot::new(&src).with_max_part_size(64));

    let backup = common::run_backup(&snapshot, &remote, 4).await.unwrap();
    assert_eq!(backup.backup_size, 1194);
    assert!(remote.has_file(BACKUP_COMPLETE_FILENAME).await.unwrap());

    let restored = restore(&remote, &dst).await;
    assert_eq!(restored.downloaded_bytes, 1194);
    for name in [
        "db/part-1/data.bin",
        "db/part-1/index.bin",
        "db/part-2/data.bin",
        "db/empty.flag",
    ] {
        assert_same_file(&src, &dst, name).await;
    }

    // the next snapshot drops one partition and grows a file
    tokio::fs::remove_dir_all(src.join("db/part-2")).await.unwrap();
    common::write_file(&src, "db/part-1/index.bin", &common::file_bytes(2, 100)).await;

    let second = common::run_backup(&snapshot, &remote, 4).await.unwrap();
    assert_eq!(second.deleted_bytes, 130 + 64);
    assert_eq!(second.uploaded_bytes, 100);
    assert!(!remote_dir.path().join("db/part-2").exists());

    // the old index is a prefix of the new one, so only its tail is fetched
    let restored = restore(&remote, &dst).await;
    assert_eq!(restored.deleted_bytes, 130);
    assert_eq!(restored.downloaded_bytes, 36);
    assert!(!dst.join("db/part-2").exists());
    assert_same_file(&src, &dst, "db/part-1/index.bin").await;
    assert_same_file(&src, &dst, "db/part-1/data.bin").await;
}

#[tokio::test]
async fn test_restore_is_idempotent() {
    let dirs = Dirs::new();
    let remote_dir = TempDir::new().unwrap();
    common::write_file(dirs.src.path(), "f", &common::file_bytes(5, 300)).await;

    let remote = new_remote_fs(&format!("fs://{}", remote_dir.path().display())).unwrap();
    let snapshot: Arc<dyn ISnapshotFs> =
        Arc::new(LocalSnapshot::new(dirs.src.path()).with_max_part_size(64));
    common::run_backup(&snapshot, &remote, 2).await.unwrap();

    restore(&remote, dirs.dst.path()).await;
    let again = restore(&remote, dirs.dst.path()).await;

    assert_eq!(again.downloaded_bytes, 0);
    assert_eq!(again.deleted_bytes, 0);
    assert_same_file(dirs.src.path(), dirs.dst.path(), "f").await;
}
