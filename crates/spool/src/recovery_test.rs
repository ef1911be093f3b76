use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use barge_store::{MemoryStore, ObjectStore, PutOptions};
use tempfile::TempDir;

use super::*;
use crate::file::recovery_copy_path;
use crate::uploader::UploaderConfig;

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    flate2::read::MultiGzDecoder::new(data)
        .read_to_end(&mut out)
        .unwrap();
    out
}

fn uploader(store: &Arc<MemoryStore>) -> Uploader {
    Uploader::new(
        "recovery",
        Arc::clone(store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default(),
        None,
    )
}

/// Shorten a file by `cut` bytes, as a crash mid-write would
fn truncate(path: &Path, cut: u64) {
    let len = fs::metadata(path).unwrap().len();
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len - cut).unwrap();
}

#[tokio::test]
async fn test_plain_files_always_recovered() {
    let dir = TempDir::new().unwrap();
    let mut stranded = SpoolFile::create(dir.path(), "events", 1, Encoding::None).unwrap();
    stranded.write(b"first\n").unwrap();
    stranded.write(b"second\n").unwrap();
    let key = stranded.object_key(None);
    let path = stranded.path().to_path_buf();
    drop(stranded);

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report, RecoveryReport {
        recovered: 1,
        ..RecoveryReport::default()
    });
    assert_eq!(store.object(&key), Some(b"first\nsecond\n".to_vec()));
    assert!(!path.exists(), "recovered file should be gone after upload");
}

#[tokio::test]
async fn test_intact_gzip_recovered() {
    let dir = TempDir::new().unwrap();
    let mut stranded = SpoolFile::create(dir.path(), "events", 1, Encoding::Gzip).unwrap();
    stranded.write(b"zipped row\n").unwrap();
    stranded.close().unwrap();
    let key = stranded.object_key(None);
    drop(stranded);

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report.recovered, 1);
    let body = store.object(&key).unwrap();
    assert_eq!(gunzip(&body), b"zipped row\n");
}

#[tokio::test]
async fn test_truncated_gzip_without_copy_left_in_place() {
    let dir = TempDir::new().unwrap();
    let mut stranded = SpoolFile::create(dir.path(), "events", 1, Encoding::Gzip).unwrap();
    stranded.write(b"zipped row\n").unwrap();
    // close removes the recovery copy, then the tail is cut off
    stranded.close().unwrap();
    let path = stranded.path().to_path_buf();
    drop(stranded);
    truncate(&path, 5);

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report, RecoveryReport {
        skipped: 1,
        ..RecoveryReport::default()
    });
    assert!(store.is_empty());
    assert!(path.exists(), "damaged files are never deleted");
}

#[tokio::test]
async fn test_copy_supersedes_truncated_counterpart() {
    let dir = TempDir::new().unwrap();
    let mut stranded = SpoolFile::create(dir.path(), "events", 1, Encoding::Gzip).unwrap();
    stranded.write(b"one\n").unwrap();
    stranded.write(b"two\n").unwrap();
    let key = stranded.object_key(None);
    let primary = stranded.path().to_path_buf();
    let copy = recovery_copy_path(&primary);
    // crash without close: the copy stays behind, then the primary loses
    // its tail
    drop(stranded);
    truncate(&primary, 4);
    assert!(copy.exists());

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report, RecoveryReport {
        recovered: 1,
        ..RecoveryReport::default()
    });
    // content comes solely from the copy, under the counterpart's key
    assert_eq!(store.len(), 1);
    assert!(!key.contains(".rec"));
    let body = store.object(&key).unwrap();
    assert_eq!(gunzip(&body), b"one\ntwo\n");
    assert!(!primary.exists(), "superseded counterpart is discarded");
    assert!(!copy.exists(), "uploaded copy is removed");
}

#[tokio::test]
async fn test_empty_files_removed() {
    let dir = TempDir::new().unwrap();
    let mut empty = SpoolFile::create(dir.path(), "events", 1, Encoding::None).unwrap();
    empty.close().unwrap();
    let path = empty.path().to_path_buf();
    drop(empty);

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report, RecoveryReport {
        deleted_empty: 1,
        ..RecoveryReport::default()
    });
    assert!(!path.exists());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_empty_copy_and_counterpart_removed_together() {
    let dir = TempDir::new().unwrap();
    let name = "barge.0a1b2c3d.20250101T000000.00001.events.log.gz";
    let primary = dir.path().join(name);
    let copy = dir.path().join(format!("{name}.rec"));
    fs::write(&primary, b"").unwrap();
    fs::write(&copy, b"").unwrap();

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report.deleted_empty, 2);
    assert_eq!(report.recovered, 0);
    assert!(!primary.exists());
    assert!(!copy.exists());
}

#[tokio::test]
async fn test_foreign_files_ignored() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
    fs::write(dir.path().join("barge.partial"), b"keep me too").unwrap();

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report.foreign, 2);
    assert!(dir.path().join("notes.txt").exists());
    assert!(dir.path().join("barge.partial").exists());
}

#[tokio::test]
async fn test_missing_directory_is_empty_scan() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("never-created");

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(&missing, None).run(&up).await.unwrap();
    up.stop().await;

    assert_eq!(report, RecoveryReport::default());
}

#[tokio::test]
async fn test_prefix_applied_to_recovered_keys() {
    let dir = TempDir::new().unwrap();
    let mut stranded = SpoolFile::create(dir.path(), "events", 1, Encoding::None).unwrap();
    stranded.write(b"row\n").unwrap();
    let expected = stranded.object_key(Some("prod/spool"));
    drop(stranded);

    let store = Arc::new(MemoryStore::new());
    let up = uploader(&store);
    let report = RecoveryScan::new(dir.path(), Some("prod/spool".to_string()))
        .run(&up)
        .await
        .unwrap();
    up.stop().await;

    assert_eq!(report.recovered, 1);
    assert!(expected.starts_with("prod/spool/events/"));
    assert_eq!(store.keys(), vec![expected]);
}
