//! Spooling engine
//!
//! The [`Spooler`] wires the engine together: records flow through the
//! key template into per-key files held by the [`FileRepository`], the
//! rotation policy decides when a file is complete, and completed files
//! travel through the primary [`Uploader`] to the object store. A
//! periodic sweep catches files that go stale with no further writes,
//! and an optional startup scan re-queues files stranded by a crash on
//! a second, dedicated pool.
//!
//! ```text
//!  ingest(batch)                sweep (interval)
//!       |                            |
//!       v                            v
//!  KeyTemplate ──> FileRepository ──rotate──> Uploader ──> ObjectStore
//!                       |                                      ^
//!                  spool dir <──────── RecoveryScan ──> recovery pool
//! ```
//!
//! Ingestion halts permanently when a write fails at the filesystem,
//! disk exhaustion included; buffered files keep uploading, but further
//! batches are refused until the process restarts.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use barge_store::{ObjectStore, PutOptions};
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::encoding::Encoding;
use crate::error::{Result, SpoolError};
use crate::record::{KeyTemplate, Record};
use crate::recovery::{RecoveryReport, RecoveryScan};
use crate::repository::FileRepository;
use crate::rotation::RotationPolicy;
use crate::uploader::{
    OverflowPolicy, RetryPolicy, UploadCallback, UploadTask, Uploader, UploaderConfig,
    UploaderMetricsSnapshot,
};

// ============================================================================
// Configuration
// ============================================================================

/// Everything a [`Spooler`] needs to run
#[derive(Clone)]
pub struct SpoolerConfig {
    /// Directory buffered files live in
    pub dir: PathBuf,
    /// When a file is complete
    pub policy: RotationPolicy,
    /// How payloads are written to disk
    pub encoding: Encoding,
    /// Template the logical key is rendered from
    pub key_template: String,
    /// Cadence of the staleness sweep
    pub sweep_interval: Duration,
    /// Prepended to every object key
    pub key_prefix: Option<String>,
    /// Per-request store options
    pub options: PutOptions,
    /// Primary pool sizing
    pub upload: UploaderConfig,
    /// Scan for stranded files at startup
    pub recovery: bool,
    /// Workers on the recovery pool
    pub recovery_workers: usize,
    /// Completion hook on the primary pool
    pub callback: Option<UploadCallback>,
}

impl SpoolerConfig {
    /// Defaults: no compression, `${key}` template, sweep every minute,
    /// recovery on with two workers
    pub fn new(dir: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
            encoding: Encoding::None,
            key_template: "${key}".to_string(),
            sweep_interval: Duration::from_secs(60),
            key_prefix: None,
            options: PutOptions::default(),
            upload: UploaderConfig::default(),
            recovery: true,
            recovery_workers: 2,
            callback: None,
        }
    }

    /// Build a runtime config from the file-level configuration
    pub fn from_config(config: &barge_config::Config) -> Result<Self> {
        let buffer = &config.buffer;
        let policy = match buffer.strategy {
            barge_config::RotationStrategy::Size => RotationPolicy::size(buffer.size_threshold)?,
            barge_config::RotationStrategy::Time => RotationPolicy::time(buffer.time_threshold)?,
            barge_config::RotationStrategy::SizeOrTime => {
                RotationPolicy::size_or_time(buffer.size_threshold, buffer.time_threshold)?
            }
        };
        let encoding = match buffer.encoding {
            barge_config::Encoding::None => Encoding::None,
            barge_config::Encoding::Gzip => Encoding::Gzip,
        };
        let upload = &config.upload;
        let retry = match upload.retry_attempts {
            0 => RetryPolicy::unbounded(upload.retry_delay),
            n => RetryPolicy::limited(n, upload.retry_delay),
        };
        let overflow = match upload.on_full {
            barge_config::OnFull::Borrow => OverflowPolicy::Borrow,
            barge_config::OnFull::Wait => OverflowPolicy::Wait,
        };
        let mut options = PutOptions::new()
            .with_multipart_threshold(upload.multipart_threshold)
            .with_multipart_chunk_size(upload.multipart_chunk_size);
        options.acl = upload.acl;
        options.encryption = upload.encryption.clone();
        options.storage_class = upload.storage_class;
        options.content_encoding = upload.content_encoding.clone();
        Ok(Self {
            dir: buffer.dir.clone(),
            policy,
            encoding,
            key_template: buffer.key_template.clone(),
            sweep_interval: buffer.sweep_interval,
            key_prefix: upload.key_prefix.clone(),
            options,
            upload: UploaderConfig::new()
                .with_workers(upload.workers)
                .with_queue_capacity((upload.queue_capacity > 0).then_some(upload.queue_capacity))
                .with_overflow(overflow)
                .with_retry(retry),
            recovery: config.recovery.enabled,
            recovery_workers: config.recovery.workers,
            callback: None,
        })
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_key_template(mut self, template: impl Into<String>) -> Self {
        self.key_template = template.into();
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_put_options(mut self, options: PutOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_upload(mut self, upload: UploaderConfig) -> Self {
        self.upload = upload;
        self
    }

    #[must_use]
    pub fn with_recovery(mut self, enabled: bool) -> Self {
        self.recovery = enabled;
        self
    }

    #[must_use]
    pub fn with_recovery_workers(mut self, workers: usize) -> Self {
        self.recovery_workers = workers;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: UploadCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for SpoolerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpoolerConfig")
            .field("dir", &self.dir)
            .field("policy", &self.policy)
            .field("encoding", &self.encoding)
            .field("key_template", &self.key_template)
            .field("sweep_interval", &self.sweep_interval)
            .field("key_prefix", &self.key_prefix)
            .field("options", &self.options)
            .field("upload", &self.upload)
            .field("recovery", &self.recovery)
            .field("recovery_workers", &self.recovery_workers)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Counters maintained by the engine
#[derive(Debug, Default)]
pub struct SpoolerMetrics {
    pub records: AtomicU64,
    pub bytes: AtomicU64,
    pub rotations: AtomicU64,
    pub write_errors: AtomicU64,
}

/// Point-in-time copy of [`SpoolerMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpoolerMetricsSnapshot {
    pub records: u64,
    pub bytes: u64,
    pub rotations: u64,
    pub write_errors: u64,
}

impl SpoolerMetrics {
    pub fn snapshot(&self) -> SpoolerMetricsSnapshot {
        SpoolerMetricsSnapshot {
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Buffering, rotation and upload engine over one spool directory
pub struct Spooler {
    repo: Arc<FileRepository>,
    template: KeyTemplate,
    policy: RotationPolicy,
    key_prefix: Option<String>,
    primary: Arc<Uploader>,
    recovery_uploader: Option<Arc<Uploader>>,
    recovery_task: Mutex<Option<JoinHandle<Result<RecoveryReport>>>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    sweep_cancel: CancellationToken,
    halted: AtomicBool,
    stopped: AtomicBool,
    metrics: Arc<SpoolerMetrics>,
}

impl Spooler {
    /// Start the engine: create the spool directory, spawn the upload
    /// pools and the staleness sweep, and kick off the recovery scan if
    /// enabled. Must be called within a Tokio runtime.
    pub fn new(config: SpoolerConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let template = KeyTemplate::parse(&config.key_template)?;
        if config.policy.needs_periodic_check() && config.sweep_interval.is_zero() {
            return Err(SpoolError::invalid_config(
                "sweep interval must be positive when time based rotation is active",
            ));
        }
        fs::create_dir_all(&config.dir).map_err(|e| SpoolError::io(&config.dir, e))?;

        let repo = Arc::new(FileRepository::new(&config.dir, config.encoding));
        let metrics = Arc::new(SpoolerMetrics::default());
        let primary = Arc::new(Uploader::new(
            "primary",
            Arc::clone(&store),
            config.options.clone(),
            config.upload,
            config.callback.clone(),
        ));

        let (recovery_uploader, recovery_task) = if config.recovery {
            let uploader = Arc::new(Uploader::new(
                "recovery",
                store,
                config.options.clone(),
                UploaderConfig::default()
                    .with_workers(config.recovery_workers)
                    .with_queue_capacity(None)
                    .with_retry(config.upload.retry),
                None,
            ));
            let scan = RecoveryScan::new(&config.dir, config.key_prefix.clone());
            let task = {
                let uploader = Arc::clone(&uploader);
                tokio::spawn(async move { scan.run(&uploader).await })
            };
            (Some(uploader), Some(task))
        } else {
            (None, None)
        };

        let sweep_cancel = CancellationToken::new();
        let sweep_task = config.policy.needs_periodic_check().then(|| {
            spawn_sweep(
                Arc::clone(&repo),
                config.policy,
                Arc::clone(&primary),
                config.key_prefix.clone(),
                Arc::clone(&metrics),
                config.sweep_interval,
                sweep_cancel.clone(),
            )
        });

        info!(
            dir = %config.dir.display(),
            policy = ?config.policy,
            encoding = ?config.encoding,
            recovery = config.recovery,
            "spooler started"
        );
        Ok(Self {
            repo,
            template,
            policy: config.policy,
            key_prefix: config.key_prefix,
            primary,
            recovery_uploader,
            recovery_task: Mutex::new(recovery_task),
            sweep_task: Mutex::new(sweep_task),
            sweep_cancel,
            halted: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            metrics,
        })
    }

    /// Start from the file-level configuration
    pub fn from_config(config: &barge_config::Config, store: Arc<dyn ObjectStore>) -> Result<Self> {
        Self::new(SpoolerConfig::from_config(config)?, store)
    }

    /// Buffer a batch of records. Each record's key is rendered from
    /// the template, the payload is appended to that key's current
    /// file, and after the whole batch the keys touched here are
    /// checked for rotation.
    ///
    /// The first failed write halts ingestion for good; records written
    /// before the failure stay buffered and keep uploading.
    pub async fn ingest<R: Record>(&self, batch: &[(R, Bytes)]) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(SpoolError::Closed);
        }
        if self.halted.load(Ordering::Acquire) {
            return Err(SpoolError::Halted);
        }
        let mut touched = HashSet::new();
        for (record, payload) in batch {
            let key = self.template.key(record);
            match self.repo.with_file(&key, |file| file.write(payload)).await {
                Ok(written) => {
                    self.metrics.records.fetch_add(1, Ordering::Relaxed);
                    self.metrics.bytes.fetch_add(written, Ordering::Relaxed);
                    touched.insert(key);
                }
                Err(err) => {
                    self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
                    if err.is_io() {
                        self.halted.store(true, Ordering::Release);
                        if err.is_disk_full() {
                            error!(key = %key, error = %err, "disk full, ingestion halted");
                        } else {
                            error!(key = %key, error = %err, "write failed, ingestion halted");
                        }
                    }
                    return Err(err);
                }
            }
        }
        rotate_due(
            &self.repo,
            touched.iter(),
            self.policy,
            &self.primary,
            self.key_prefix.as_deref(),
            &self.metrics,
        )
        .await
    }

    /// Whether a failed write has stopped ingestion
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Bytes currently buffered across all live files
    pub async fn buffered_bytes(&self) -> u64 {
        let mut total = 0;
        self.repo.each_file(|file| total += file.size()).await;
        total
    }

    pub fn metrics(&self) -> SpoolerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Counters of the primary upload pool
    pub fn upload_metrics(&self) -> UploaderMetricsSnapshot {
        self.primary.metrics()
    }

    /// Wait for the startup scan and return its report. `None` when
    /// recovery is disabled or the report was already consumed.
    pub async fn recovery_report(&self) -> Option<Result<RecoveryReport>> {
        let task = self.recovery_task.lock().await.take()?;
        match task.await {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(error = %err, "recovery scan task panicked");
                None
            }
        }
    }

    /// Drain the engine: stop the sweep, close every live file and hand
    /// it to the primary pool (empty files are deleted instead), then
    /// wait for both pools to finish. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("spooler shutting down");

        // stop the clock first so no sweep races the final drain
        self.sweep_cancel.cancel();
        if let Some(task) = self.sweep_task.lock().await.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "sweep task panicked");
        }
        // let the startup scan finish queueing before pools close
        if let Some(task) = self.recovery_task.lock().await.take() {
            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!(error = %err, "recovery scan failed"),
                Err(err) => warn!(error = %err, "recovery scan task panicked"),
            }
        }

        self.repo.shutdown();
        let mut drained = Vec::new();
        self.repo
            .with_factories(self.repo.keys(), |ctx| {
                match ctx.detach() {
                    Ok(Some(file)) => drained.push(file),
                    Ok(None) => {}
                    Err(err) => {
                        // the file stays on disk; the next startup scan
                        // picks it up
                        warn!(key = ctx.key(), error = %err, "failed to close file during drain");
                    }
                }
                Ok(())
            })
            .await?;
        for mut file in drained {
            if file.is_empty() {
                if let Err(err) = file.delete() {
                    warn!(path = %file.path().display(), error = %err, "failed to remove empty file");
                }
                continue;
            }
            let key = file.object_key(self.key_prefix.as_deref());
            self.primary.submit(UploadTask::new(file, key)).await;
        }

        self.primary.stop().await;
        if let Some(recovery) = &self.recovery_uploader {
            recovery.stop().await;
        }
        info!("spooler stopped");
        Ok(())
    }
}

/// Rotate every listed key whose current file the policy declares done,
/// then queue the rotated files
async fn rotate_due<I>(
    repo: &FileRepository,
    keys: I,
    policy: RotationPolicy,
    uploader: &Uploader,
    key_prefix: Option<&str>,
    metrics: &SpoolerMetrics,
) -> Result<()>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut rotated = Vec::new();
    repo.with_factories(keys, |ctx| {
        let due = ctx.rotate_if(|file| {
            !file.is_empty() && policy.should_rotate(file.size(), file.age())
        })?;
        if let Some(file) = due {
            rotated.push(file);
        }
        Ok(())
    })
    .await?;
    for file in rotated {
        metrics.rotations.fetch_add(1, Ordering::Relaxed);
        let key = file.object_key(key_prefix);
        debug!(
            path = %file.path().display(),
            key = %key,
            bytes = file.size(),
            "rotated file for upload"
        );
        uploader.submit(UploadTask::new(file, key)).await;
    }
    Ok(())
}

fn spawn_sweep(
    repo: Arc<FileRepository>,
    policy: RotationPolicy,
    uploader: Arc<Uploader>,
    key_prefix: Option<String>,
    metrics: Arc<SpoolerMetrics>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick fires immediately; nothing can be stale yet
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let keys = repo.keys();
                    if let Err(err) = rotate_due(
                        &repo,
                        keys,
                        policy,
                        &uploader,
                        key_prefix.as_deref(),
                        &metrics,
                    )
                    .await
                    {
                        warn!(error = %err, "rotation sweep failed");
                    }
                }
            }
        }
        debug!("rotation sweep stopped");
    })
}

#[cfg(test)]
#[path = "spooler_test.rs"]
mod spooler_test;
