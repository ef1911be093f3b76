//! Per-request upload options
//!
//! Options travel with each put as an immutable snapshot, so a
//! configuration change never affects uploads already queued.

use serde::Deserialize;

/// Smallest chunk size accepted for multipart uploads (5 MiB, the
/// common object-store minimum for non-terminal parts).
pub const MIN_MULTIPART_CHUNK: u64 = 5 * 1024 * 1024;

/// Canned access control list applied to uploaded objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerFullControl,
}

impl Acl {
    /// Wire form of the ACL
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// Server-side encryption applied by the store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ServerSideEncryption {
    /// AES-256 managed by the store
    Aes256,
    /// KMS-managed key; `key_id` of `None` uses the store default key
    AwsKms { key_id: Option<String> },
}

/// Storage class for uploaded objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    Standard,
    ReducedRedundancy,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    Glacier,
    DeepArchive,
}

impl StorageClass {
    /// Wire form of the storage class
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::ReducedRedundancy => "REDUCED_REDUNDANCY",
            Self::StandardIa => "STANDARD_IA",
            Self::OnezoneIa => "ONEZONE_IA",
            Self::IntelligentTiering => "INTELLIGENT_TIERING",
            Self::Glacier => "GLACIER",
            Self::DeepArchive => "DEEP_ARCHIVE",
        }
    }
}

/// Options attached to a single put request
#[derive(Debug, Clone, PartialEq)]
pub struct PutOptions {
    /// Canned ACL, if any
    /// Default: None (store default)
    pub acl: Option<Acl>,

    /// Server-side encryption, if any
    /// Default: None
    pub encryption: Option<ServerSideEncryption>,

    /// Storage class, if any
    /// Default: None (store default)
    pub storage_class: Option<StorageClass>,

    /// Content-Encoding header value (e.g. "gzip")
    /// Default: None
    pub content_encoding: Option<String>,

    /// Files at or above this size use the multipart path
    /// Default: 16 MiB
    pub multipart_threshold: u64,

    /// Part size for multipart uploads
    /// Default: 8 MiB
    pub multipart_chunk_size: u64,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            acl: None,
            encryption: None,
            storage_class: None,
            content_encoding: None,
            multipart_threshold: 16 * 1024 * 1024,
            multipart_chunk_size: 8 * 1024 * 1024,
        }
    }
}

impl PutOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the canned ACL
    #[must_use]
    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acl = Some(acl);
        self
    }

    /// Set server-side encryption
    #[must_use]
    pub fn with_encryption(mut self, encryption: ServerSideEncryption) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Set the storage class
    #[must_use]
    pub fn with_storage_class(mut self, class: StorageClass) -> Self {
        self.storage_class = Some(class);
        self
    }

    /// Set the Content-Encoding header
    #[must_use]
    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    /// Set the multipart threshold in bytes
    #[must_use]
    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    /// Set the multipart part size in bytes
    #[must_use]
    pub fn with_multipart_chunk_size(mut self, bytes: u64) -> Self {
        self.multipart_chunk_size = bytes;
        self
    }
}
