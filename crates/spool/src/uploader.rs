//! Upload worker pool
//!
//! Completed spool files are handed to an [`Uploader`], which queues them
//! on an mpsc channel drained by a fixed set of worker tasks. Each worker
//! retries a file according to the [`RetryPolicy`] and deletes it from
//! disk once the store accepts it. A file that exhausts its retry budget
//! is left on disk for the next startup's recovery scan.
//!
//! The queue can be bounded. What happens when it fills is governed by
//! [`OverflowPolicy`]: either the submitting task runs the upload itself
//! (keeping backpressure on the producer) or it waits for a slot. A task
//! submitted after [`Uploader::stop`] also runs inline; work is never
//! dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use barge_store::{ObjectStore, PutOptions};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::file::SpoolFile;

/// Behavior of `submit` when the bounded queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Run the upload on the submitting task
    #[default]
    Borrow,
    /// Wait until a queue slot frees up
    Wait,
}

/// Retry budget applied to each file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per file; `None` retries until delivery
    pub attempts: Option<u32>,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, one second apart
    fn default() -> Self {
        Self {
            attempts: Some(3),
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Give up after `attempts` tries
    pub fn limited(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: Some(attempts),
            delay,
        }
    }

    /// Retry until the store accepts the file
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            attempts: None,
            delay,
        }
    }
}

/// Pool sizing and queueing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploaderConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Queue depth; `None` makes the queue unbounded
    pub queue_capacity: Option<usize>,
    /// Reaction to a full queue
    pub overflow: OverflowPolicy,
    /// Per-file retry budget
    pub retry: RetryPolicy,
}

impl Default for UploaderConfig {
    /// Four workers over a queue of eight, borrowing on overflow
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: Some(8),
            overflow: OverflowPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl UploaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A closed spool file bound for the store
#[derive(Debug)]
pub struct UploadTask {
    pub file: SpoolFile,
    pub key: String,
}

impl UploadTask {
    pub fn new(file: SpoolFile, key: String) -> Self {
        Self { file, key }
    }
}

/// Terminal result of one file's upload, passed to the completion callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Whether the store accepted the file
    pub delivered: bool,
    /// Attempts spent, including the final one
    pub attempts: u64,
}

/// Invoked exactly once per submitted file, after delivery or exhaustion
pub type UploadCallback = Arc<dyn Fn(&SpoolFile, &UploadOutcome) + Send + Sync>;

/// Counters maintained by the pool
#[derive(Debug, Default)]
pub struct UploaderMetrics {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub retries: AtomicU64,
    pub inline_runs: AtomicU64,
}

/// Point-in-time copy of [`UploaderMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploaderMetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    pub inline_runs: u64,
}

impl UploaderMetrics {
    pub fn snapshot(&self) -> UploaderMetricsSnapshot {
        UploaderMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            inline_runs: self.inline_runs.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
enum TaskSender {
    Bounded(mpsc::Sender<UploadTask>),
    Unbounded(mpsc::UnboundedSender<UploadTask>),
}

enum TaskReceiver {
    Bounded(mpsc::Receiver<UploadTask>),
    Unbounded(mpsc::UnboundedReceiver<UploadTask>),
}

impl TaskReceiver {
    async fn recv(&mut self) -> Option<UploadTask> {
        match self {
            TaskReceiver::Bounded(rx) => rx.recv().await,
            TaskReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Retrying upload pool over an [`ObjectStore`]
pub struct Uploader {
    inner: Arc<Inner>,
    overflow: OverflowPolicy,
    sender: Mutex<Option<TaskSender>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    name: &'static str,
    store: Arc<dyn ObjectStore>,
    options: PutOptions,
    retry: RetryPolicy,
    callback: Option<UploadCallback>,
    metrics: UploaderMetrics,
}

impl Uploader {
    /// Create the pool and spawn its workers. Must be called within a
    /// Tokio runtime.
    pub fn new(
        name: &'static str,
        store: Arc<dyn ObjectStore>,
        options: PutOptions,
        config: UploaderConfig,
        callback: Option<UploadCallback>,
    ) -> Self {
        let (sender, receiver) = match config.queue_capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (TaskSender::Bounded(tx), TaskReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (TaskSender::Unbounded(tx), TaskReceiver::Unbounded(rx))
            }
        };
        let inner = Arc::new(Inner {
            name,
            store,
            options,
            retry: config.retry,
            callback,
            metrics: UploaderMetrics::default(),
        });
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    Arc::clone(&inner),
                    Arc::clone(&receiver),
                    worker,
                ))
            })
            .collect();
        Self {
            inner,
            overflow: config.overflow,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        }
    }

    /// Queue a file for upload. On a full bounded queue the call either
    /// borrows the submitting task or waits, per the overflow policy;
    /// after [`stop`](Self::stop) it runs the upload inline.
    pub async fn submit(&self, task: UploadTask) {
        self.inner.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            warn!(
                uploader = self.inner.name,
                key = %task.key,
                "upload queue closed, running inline"
            );
            self.run_inline(task).await;
            return;
        };
        match sender {
            TaskSender::Unbounded(tx) => {
                if let Err(rejected) = tx.send(task) {
                    warn!(
                        uploader = self.inner.name,
                        "upload workers gone, running inline"
                    );
                    self.run_inline(rejected.0).await;
                }
            }
            TaskSender::Bounded(tx) => match tx.try_send(task) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(task)) => match self.overflow {
                    OverflowPolicy::Borrow => {
                        debug!(
                            uploader = self.inner.name,
                            key = %task.key,
                            "upload queue full, borrowing submitter"
                        );
                        self.run_inline(task).await;
                    }
                    OverflowPolicy::Wait => {
                        if let Err(rejected) = tx.send(task).await {
                            warn!(
                                uploader = self.inner.name,
                                "upload workers gone, running inline"
                            );
                            self.run_inline(rejected.0).await;
                        }
                    }
                },
                Err(mpsc::error::TrySendError::Closed(task)) => {
                    warn!(
                        uploader = self.inner.name,
                        "upload workers gone, running inline"
                    );
                    self.run_inline(task).await;
                }
            },
        }
    }

    /// Close the queue and wait for the workers to drain it
    pub async fn stop(&self) {
        self.sender.lock().await.take();
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(uploader = self.inner.name, error = %err, "upload worker panicked");
            }
        }
    }

    pub fn metrics(&self) -> UploaderMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    async fn run_inline(&self, task: UploadTask) {
        self.inner.metrics.inline_runs.fetch_add(1, Ordering::Relaxed);
        self.inner.execute(task).await;
    }
}

async fn worker_loop(inner: Arc<Inner>, receiver: Arc<Mutex<TaskReceiver>>, worker: usize) {
    debug!(uploader = inner.name, worker, "upload worker started");
    loop {
        // the receiver lock is held only while waiting for a task
        let task = receiver.lock().await.recv().await;
        let Some(task) = task else { break };
        inner.execute(task).await;
    }
    debug!(uploader = inner.name, worker, "upload worker stopped");
}

impl Inner {
    async fn execute(&self, mut task: UploadTask) {
        if let Err(err) = task.file.close() {
            warn!(
                uploader = self.name,
                path = %task.file.path().display(),
                error = %err,
                "failed to close file before upload"
            );
        }
        let mut attempts: u64 = 0;
        let delivered = loop {
            attempts += 1;
            match self.put(&task).await {
                Ok(()) => break true,
                Err(err) => {
                    if let Some(max) = self.retry.attempts
                        && attempts >= u64::from(max)
                    {
                        warn!(
                            uploader = self.name,
                            key = %task.key,
                            attempts,
                            error = %err,
                            "retry budget exhausted, leaving file on disk"
                        );
                        break false;
                    }
                    debug!(
                        uploader = self.name,
                        key = %task.key,
                        attempts,
                        error = %err,
                        "upload failed, will retry"
                    );
                    self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        };
        if delivered {
            self.metrics.completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                uploader = self.name,
                key = %task.key,
                attempts,
                bytes = task.file.size(),
                "file uploaded"
            );
            if let Err(err) = task.file.delete() {
                warn!(
                    uploader = self.name,
                    path = %task.file.path().display(),
                    error = %err,
                    "failed to remove uploaded file"
                );
            }
        } else {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(callback) = &self.callback {
            callback(&task.file, &UploadOutcome {
                delivered,
                attempts,
            });
        }
    }

    async fn put(&self, task: &UploadTask) -> barge_store::Result<()> {
        let mut options = self.options.clone();
        if options.content_encoding.is_none() {
            options.content_encoding = task
                .file
                .encoding()
                .content_encoding()
                .map(str::to_string);
        }
        if task.file.size() >= options.multipart_threshold {
            self.store
                .put_multipart(task.file.path(), &task.key, &options)
                .await
        } else {
            self.store.put(task.file.path(), &task.key, &options).await
        }
    }
}

#[cfg(test)]
#[path = "uploader_test.rs"]
mod uploader_test;
