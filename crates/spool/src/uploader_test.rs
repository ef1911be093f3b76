use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use barge_store::MemoryStore;
use tempfile::TempDir;

use super::*;
use crate::encoding::Encoding;

fn spool_file(dir: &Path, key: &str, payload: &[u8]) -> SpoolFile {
    let mut file = SpoolFile::create(dir, key, 1, Encoding::None).unwrap();
    file.write(payload).unwrap();
    file.close().unwrap();
    file
}

fn task(file: SpoolFile) -> UploadTask {
    let key = file.object_key(None);
    UploadTask::new(file, key)
}

/// Callback that records every completion it sees
fn recording_callback() -> (UploadCallback, Arc<StdMutex<Vec<(String, UploadOutcome)>>>) {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: UploadCallback = Arc::new(move |file: &SpoolFile, outcome: &UploadOutcome| {
        sink.lock().unwrap().push((file.key().to_string(), *outcome));
    });
    (callback, seen)
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn test_upload_removes_file_from_disk() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default(),
        None,
    );

    let file = spool_file(dir.path(), "events", b"hello\n");
    let path = file.path().to_path_buf();
    let object_key = file.object_key(None);
    uploader.submit(task(file)).await;
    uploader.stop().await;

    assert_eq!(store.object(&object_key), Some(b"hello\n".to_vec()));
    assert!(!path.exists(), "uploaded file should be deleted");
    let metrics = uploader.metrics();
    assert_eq!(metrics.submitted, 1);
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.failed, 0);
}

#[tokio::test]
async fn test_transient_failures_retried_within_budget() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.fail_next(3);
    let (callback, seen) = recording_callback();
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default()
            .with_retry(RetryPolicy::limited(5, Duration::from_millis(10))),
        Some(callback),
    );

    let file = spool_file(dir.path(), "events", b"row\n");
    let path = file.path().to_path_buf();
    uploader.submit(task(file)).await;
    uploader.stop().await;

    // fourth attempt lands; callback fires exactly once
    assert_eq!(store.attempts(), 4);
    assert!(!path.exists());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "events");
    assert_eq!(seen[0].1, UploadOutcome {
        delivered: true,
        attempts: 4,
    });
    let metrics = uploader.metrics();
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.retries, 3);
}

#[tokio::test]
async fn test_exhausted_budget_leaves_file_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.fail_next(10);
    let (callback, seen) = recording_callback();
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default()
            .with_retry(RetryPolicy::limited(2, Duration::from_millis(10))),
        Some(callback),
    );

    let file = spool_file(dir.path(), "events", b"row\n");
    let path = file.path().to_path_buf();
    uploader.submit(task(file)).await;
    uploader.stop().await;

    assert!(path.exists(), "exhausted file must stay for recovery");
    assert!(store.is_empty());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, UploadOutcome {
        delivered: false,
        attempts: 2,
    });
    let metrics = uploader.metrics();
    assert_eq!(metrics.completed, 0);
    assert_eq!(metrics.failed, 1);
}

// ============================================================================
// Queue overflow
// ============================================================================

#[tokio::test]
async fn test_full_queue_borrows_submitter() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    // first attempt fails so the lone worker sits in its retry pause
    store.fail_next(1);
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default()
            .with_workers(1)
            .with_queue_capacity(Some(1))
            .with_overflow(OverflowPolicy::Borrow)
            .with_retry(RetryPolicy::limited(3, Duration::from_millis(500))),
        None,
    );

    uploader.submit(task(spool_file(dir.path(), "a", b"1\n"))).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    uploader.submit(task(spool_file(dir.path(), "b", b"2\n"))).await;
    uploader.submit(task(spool_file(dir.path(), "c", b"3\n"))).await;
    uploader.stop().await;

    let metrics = uploader.metrics();
    assert_eq!(metrics.submitted, 3);
    assert_eq!(metrics.completed, 3);
    assert_eq!(metrics.inline_runs, 1);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_full_queue_waits_for_slot() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.fail_next(1);
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default()
            .with_workers(1)
            .with_queue_capacity(Some(1))
            .with_overflow(OverflowPolicy::Wait)
            .with_retry(RetryPolicy::limited(3, Duration::from_millis(300))),
        None,
    );

    uploader.submit(task(spool_file(dir.path(), "a", b"1\n"))).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    uploader.submit(task(spool_file(dir.path(), "b", b"2\n"))).await;
    let started = Instant::now();
    uploader.submit(task(spool_file(dir.path(), "c", b"3\n"))).await;
    let waited = started.elapsed();
    uploader.stop().await;

    assert!(
        waited >= Duration::from_millis(150),
        "wait policy returned after {waited:?}"
    );
    let metrics = uploader.metrics();
    assert_eq!(metrics.inline_runs, 0);
    assert_eq!(metrics.completed, 3);
}

#[tokio::test]
async fn test_submit_after_stop_runs_inline() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default(),
        None,
    );
    uploader.stop().await;

    uploader.submit(task(spool_file(dir.path(), "late", b"x\n"))).await;

    let metrics = uploader.metrics();
    assert_eq!(metrics.inline_runs, 1);
    assert_eq!(metrics.completed, 1);
    assert_eq!(store.len(), 1);
}

// ============================================================================
// Store interaction
// ============================================================================

#[tokio::test]
async fn test_multipart_chosen_by_threshold() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default().with_multipart_threshold(64),
        UploaderConfig::default(),
        None,
    );

    let small = spool_file(dir.path(), "small", b"tiny\n");
    let small_key = small.object_key(None);
    let large = spool_file(dir.path(), "large", &[b'x'; 256]);
    let large_key = large.object_key(None);
    uploader.submit(task(small)).await;
    uploader.submit(task(large)).await;
    uploader.stop().await;

    assert!(!store.stored(&small_key).unwrap().multipart);
    assert!(store.stored(&large_key).unwrap().multipart);
}

#[tokio::test]
async fn test_content_encoding_follows_file_encoding() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let uploader = Uploader::new(
        "primary",
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        PutOptions::default(),
        UploaderConfig::default(),
        None,
    );

    let mut gz = SpoolFile::create(dir.path(), "zipped", 1, Encoding::Gzip).unwrap();
    gz.write(b"compressed row\n").unwrap();
    gz.close().unwrap();
    let gz_key = gz.object_key(None);
    let plain = spool_file(dir.path(), "plain", b"row\n");
    let plain_key = plain.object_key(None);
    uploader.submit(task(gz)).await;
    uploader.submit(task(plain)).await;
    uploader.stop().await;

    let gz_opts = store.stored(&gz_key).unwrap().options;
    assert_eq!(gz_opts.content_encoding.as_deref(), Some("gzip"));
    let plain_opts = store.stored(&plain_key).unwrap().options;
    assert_eq!(plain_opts.content_encoding, None);
}
