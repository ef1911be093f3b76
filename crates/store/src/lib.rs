//! Barge - Object store
//!
//! The upload boundary of barge: a bucket-scoped [`ObjectStore`] trait that
//! transfers a local file to a destination key, plus two shipped
//! implementations.
//!
//! # Architecture
//!
//! ```text
//! [Uploader worker] --(path, key, PutOptions)--> [ObjectStore impl] --> bucket
//! ```
//!
//! Every put names a local file by path rather than handing over an open
//! handle, so an implementation can reopen the file per retry attempt.
//! Callers choose between [`ObjectStore::put`] and
//! [`ObjectStore::put_multipart`] based on file size versus the configured
//! multipart threshold.
//!
//! # Implementations
//!
//! | Store | Purpose |
//! |-------|---------|
//! | `LocalStore` | Copies objects into a base directory (dev / drain-to-disk) |
//! | `MemoryStore` | In-memory map with failure injection (tests) |
//!
//! # Example
//!
//! ```ignore
//! use barge_store::{LocalStore, ObjectStore, PutOptions};
//!
//! let store = LocalStore::new("/var/lib/barge/out")?;
//! store.put(path, "logs/web/20260101T000000/part-0.log", &PutOptions::new()).await?;
//! ```

use std::path::Path;

use async_trait::async_trait;

/// Store error types
pub mod error;

/// Local-directory store
pub mod local;

/// In-memory store for tests
pub mod memory;

/// Per-request upload options
pub mod options;

pub use error::{Result, StoreError};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use options::{Acl, MIN_MULTIPART_CHUNK, PutOptions, ServerSideEncryption, StorageClass};

/// A bucket-scoped destination for completed spool files.
///
/// Implementations perform the actual transfer; retry policy lives with the
/// caller. Both methods must be safe to call again with the same arguments
/// after a failure (at-least-once delivery is the system contract).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` as one object under `key`.
    async fn put(&self, path: &Path, key: &str, opts: &PutOptions) -> Result<()>;

    /// Upload the file at `path` under `key` in parts of
    /// `opts.multipart_chunk_size` bytes.
    async fn put_multipart(&self, path: &Path, key: &str, opts: &PutOptions) -> Result<()>;
}
