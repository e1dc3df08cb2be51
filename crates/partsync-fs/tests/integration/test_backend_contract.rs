//! Behaviour every remote backend must share

use partsync_core::domain::names::{BACKUP_COMPLETE_FILENAME, BACKUP_METADATA_FILENAME};
use partsync_core::domain::{sort_parts, Part};
use partsync_core::ports::IOriginFs;
use partsync_fs::FsRemote;
use tempfile::TempDir;

use crate::common::{self, all_backends};

// ============================================================================
// Parts
// ============================================================================

#[tokio::test]
async fn test_upload_list_download() {
    for backend in all_backends() {
        let remote = backend.remote.as_ref();
        let parts = vec![
            Part::new("db/index.bin", 300, 0, 128),
            Part::new("db/index.bin", 300, 128, 128),
            Part::new("db/index.bin", 300, 256, 44),
            Part::new("db/empty", 0, 0, 0),
        ];
        for part in &parts {
            common::upload(remote, part).await;
        }

        let mut listed = remote.list_parts().await.unwrap();
        sort_parts(&mut listed);
        let mut expected = parts.clone();
        sort_parts(&mut expected);
        assert_eq!(listed, expected, "{}", backend.name);
        assert!(listed.iter().all(|p| !p.is_broken()), "{}", backend.name);

        for part in &parts {
            let mut sink = Vec::new();
            remote.download_part(part, &mut sink).await.unwrap();
            assert_eq!(sink, common::part_bytes(part), "{}", backend.name);
        }
    }
}

#[tokio::test]
async fn test_listing_skips_auxiliary_files() {
    for backend in all_backends() {
        let remote = backend.remote.as_ref();
        common::upload(remote, &Part::new("a", 1, 0, 1)).await;
        remote.create_file(BACKUP_COMPLETE_FILENAME, b"").await.unwrap();
        remote.create_file(BACKUP_METADATA_FILENAME, b"{}").await.unwrap();

        assert_eq!(remote.list_parts().await.unwrap().len(), 1, "{}", backend.name);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_fs_listing_skips_non_utf8_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = TempDir::new().unwrap();
    let remote = FsRemote::new(dir.path());
    let part = Part::new("db/data", 5, 0, 5);
    common::upload(&remote, &part).await;
    std::fs::write(dir.path().join(OsStr::from_bytes(b"stray\xff")), b"junk").unwrap();
    std::fs::create_dir_all(dir.path().join("db")).unwrap();
    std::fs::write(dir.path().join("db").join(OsStr::from_bytes(b"\xfe")), b"junk").unwrap();

    assert_eq!(remote.list_parts().await.unwrap(), vec![part]);
}

#[tokio::test]
async fn test_size_mismatch_on_upload() {
    for backend in all_backends() {
        let remote = backend.remote.as_ref();
        let part = Part::new("f", 10, 0, 10);
        let mut source: &[u8] = &[0u8; 11];
        assert!(
            remote.upload_part(&part, &mut source).await.is_err(),
            "{}",
            backend.name
        );
    }
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    for backend in all_backends() {
        let remote = backend.remote.as_ref();
        let part = Part::new("dir/f", 2, 0, 2);
        common::upload(remote, &part).await;

        remote.delete_part(&part).await.unwrap();
        remote.delete_part(&part).await.unwrap();
        remote.remove_empty_dirs().await.unwrap();
        assert!(remote.list_parts().await.unwrap().is_empty(), "{}", backend.name);
    }
}

#[tokio::test]
async fn test_server_side_copy_within_kind() {
    for backend in all_backends() {
        let remote = backend.remote.as_ref();
        let part = Part::new("x/y", 5, 0, 5);
        common::upload(remote, &part).await;

        // copying onto itself keeps the object intact
        remote.copy_part(remote.as_origin(), &part).await.unwrap();

        let mut sink = Vec::new();
        remote.download_part(&part, &mut sink).await.unwrap();
        assert_eq!(sink, common::part_bytes(&part), "{}", backend.name);
    }
}

#[tokio::test]
async fn test_copy_refuses_other_kind() {
    let backends = all_backends();
    let (fs, memory) = (&backends[0].remote, &backends[1].remote);
    let part = Part::new("f", 1, 0, 1);
    common::upload(fs.as_ref(), &part).await;
    common::upload(memory.as_ref(), &part).await;

    assert!(fs.copy_part(memory.as_origin(), &part).await.is_err());
    assert!(memory.copy_part(fs.as_origin(), &part).await.is_err());
}

// ============================================================================
// Auxiliary files
// ============================================================================

#[tokio::test]
async fn test_auxiliary_file_lifecycle() {
    for backend in all_backends() {
        let remote = backend.remote.as_ref();
        assert!(!remote.has_file(BACKUP_COMPLETE_FILENAME).await.unwrap());

        remote.create_file(BACKUP_METADATA_FILENAME, b"v1").await.unwrap();
        remote.create_file(BACKUP_METADATA_FILENAME, b"v2").await.unwrap();
        assert_eq!(
            remote.read_file(BACKUP_METADATA_FILENAME).await.unwrap(),
            b"v2",
            "{}",
            backend.name
        );

        remote.delete_file(BACKUP_METADATA_FILENAME).await.unwrap();
        remote.delete_file(BACKUP_METADATA_FILENAME).await.unwrap();
        assert!(!remote.has_file(BACKUP_METADATA_FILENAME).await.unwrap());
    }
}
