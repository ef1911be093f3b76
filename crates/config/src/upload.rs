//! Upload pool and destination configuration

use std::time::Duration;

use barge_store::{Acl, ServerSideEncryption, StorageClass};
use serde::Deserialize;

/// What a full upload queue does to the submitting task
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OnFull {
    /// Run the upload on the submitting task (default)
    #[default]
    Borrow,
    /// Wait for a queue slot to open
    Wait,
}

/// Upload pool and destination configuration
///
/// # Example
///
/// ```toml
/// [upload]
/// workers = 8
/// queue_capacity = 16
/// on_full = "wait"
/// retry_attempts = 5
/// retry_delay = "2s"
/// key_prefix = "prod/logs"
/// acl = "private"
/// storage_class = "standard_ia"
///
/// [upload.encryption]
/// mode = "aws_kms"
/// key_id = "alias/barge"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Worker tasks draining the upload queue
    /// Default: 4
    pub workers: usize,

    /// Queue depth; 0 makes the queue unbounded
    /// Default: 8
    pub queue_capacity: usize,

    /// Reaction to a full queue (borrow, wait)
    /// Default: borrow
    pub on_full: OnFull,

    /// Attempts per file; 0 retries until delivered
    /// Default: 3
    pub retry_attempts: u32,

    /// Pause between attempts
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Files at or above this size upload in parts
    /// Default: 16MB
    pub multipart_threshold: u64,

    /// Part size for multipart uploads
    /// Default: 8MB
    pub multipart_chunk_size: u64,

    /// Prepended to every object key
    /// Default: none
    pub key_prefix: Option<String>,

    /// Canned ACL applied to uploaded objects
    /// Default: none (store default)
    pub acl: Option<Acl>,

    /// Server-side encryption applied by the store
    /// Default: none
    pub encryption: Option<ServerSideEncryption>,

    /// Storage class for uploaded objects
    /// Default: none (store default)
    pub storage_class: Option<StorageClass>,

    /// Explicit Content-Encoding header; unset derives it from the
    /// file's encoding
    /// Default: none
    pub content_encoding: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 8,
            on_full: OnFull::Borrow,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            multipart_threshold: 16 * 1024 * 1024, // 16MB
            multipart_chunk_size: 8 * 1024 * 1024, // 8MB
            key_prefix: None,
            acl: None,
            encryption: None,
            storage_class: None,
            content_encoding: None,
        }
    }
}
