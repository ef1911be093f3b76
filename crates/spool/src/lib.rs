//! Barge - Spooling engine
//!
//! Buffers a stream of small records into per-key files on local disk,
//! rotates a file out once the configured policy declares it complete,
//! and ships completed files to an object store through bounded,
//! retrying worker pools. Files stranded by a crash are found, validated
//! and re-queued on the next start.
//!
//! # Architecture
//!
//! ```text
//!  ingest(batch)                     sweep (interval)
//!       |                                 |
//!       v                                 v
//!  KeyTemplate ---> FileRepository --- rotate ---> Uploader ---> ObjectStore
//!                    one FileContext per key,          ^
//!                    one current SpoolFile each        |
//!                                                recovery pool
//!  spool dir ------> RecoveryScan (startup) ----------/
//! ```
//!
//! Writers to different keys never contend; within one key, writes and
//! rotation are serialized, so a rotated file holds exactly the records
//! written before the swap. Delivery is at least once: a crash between
//! upload and local deletion re-uploads the same bytes on restart.
//!
//! # Durability
//!
//! | Encoding | Crash behavior |
//! |----------|----------------|
//! | `none`   | Always recoverable; at most the interrupted write is lost |
//! | `gzip`   | One gzip member per write; a copy-first duplicate covers a torn tail |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use barge_spool::{FieldMap, RotationPolicy, Spooler, SpoolerConfig};
//! use barge_store::LocalStore;
//! use bytes::Bytes;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(LocalStore::new("/var/lib/barge/out")?);
//! let config = SpoolerConfig::new("/var/lib/barge/spool", RotationPolicy::size(64 << 20)?)
//!     .with_key_template("${host}-${app}");
//! let spooler = Spooler::new(config, store)?;
//!
//! let record = FieldMap::new().with("host", "web-1").with("app", "nginx");
//! spooler.ingest(&[(record, Bytes::from_static(b"payload\n"))]).await?;
//! spooler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

/// Per-key file factory
pub mod context;

/// On-disk payload encodings
pub mod encoding;

/// Engine error types
pub mod error;

/// One buffered file and its naming grammar
pub mod file;

/// Records, key templates and normalization
pub mod record;

/// Startup scan for stranded files
pub mod recovery;

/// Key-to-context map with per-key locking
pub mod repository;

/// When a file is complete
pub mod rotation;

/// The engine facade
pub mod spooler;

/// Retrying upload worker pool
pub mod uploader;

pub use context::FileContext;
pub use encoding::Encoding;
pub use error::{Result, SpoolError};
pub use file::SpoolFile;
pub use record::{FieldMap, KeyTemplate, Record};
pub use recovery::{RecoveryReport, RecoveryScan};
pub use repository::FileRepository;
pub use rotation::RotationPolicy;
pub use spooler::{Spooler, SpoolerConfig, SpoolerMetrics, SpoolerMetricsSnapshot};
pub use uploader::{
    OverflowPolicy, RetryPolicy, UploadCallback, UploadOutcome, UploadTask, Uploader,
    UploaderConfig, UploaderMetrics, UploaderMetricsSnapshot,
};
