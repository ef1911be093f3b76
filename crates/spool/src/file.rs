//! Spool file: one on-disk buffer file plus its write state
//!
//! # Naming
//!
//! ```text
//! {tag}.{id}.{bucket}.{part}.{key}{ext}[.rec]
//!
//! barge.3fa85f64.20260823T145500.00012.nginx-access.log.gz
//! ```
//!
//! `tag` is fixed, `id` random per file, `bucket` the creation timestamp,
//! `part` a per-key counter, `key` the normalized logical key (the only
//! field that may contain `.`), `ext` reflects the encoding, and `.rec`
//! marks a gzip recovery copy. The grammar is parseable after a crash, so
//! a restarted process can rebuild a file's descriptor from its name alone.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::encoding::{Encoding, SpoolWrite, validate_gzip};
use crate::error::{Result, SpoolError};

/// Fixed leading tag of every spool file name
pub const FILE_TAG: &str = "barge";

/// Suffix marking a gzip recovery copy
pub const RECOVERY_MARKER: &str = ".rec";

const BUCKET_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One local buffer file and its write state.
///
/// Open files accept appends through their encoding; closed files are
/// immutable and wait for upload or deletion. After a crash a `SpoolFile`
/// is rebuilt from the on-disk name in closed state.
pub struct SpoolFile {
    id: String,
    key: String,
    bucket: String,
    part: u32,
    path: PathBuf,
    bytes: u64,
    created_at: DateTime<Utc>,
    encoding: Encoding,
    writer: Option<Box<dyn SpoolWrite>>,
    deleted: bool,
}

impl SpoolFile {
    /// Create a fresh, empty, open spool file under `dir`
    pub(crate) fn create(dir: &Path, key: &str, part: u32, encoding: Encoding) -> Result<Self> {
        let created_at = Utc::now();
        let bucket = created_at.format(BUCKET_FORMAT).to_string();
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);

        let name = format!(
            "{FILE_TAG}.{id}.{bucket}.{part:05}.{key}{}",
            encoding.extension()
        );
        fs::create_dir_all(dir).map_err(|e| SpoolError::io(dir, e))?;
        let path = dir.join(name);
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| SpoolError::io(&path, e))?;
        let writer = encoding.writer(file, &path);

        Ok(Self {
            id,
            key: key.to_string(),
            bucket,
            part,
            path,
            bytes: 0,
            created_at,
            encoding,
            writer: Some(writer),
            deleted: false,
        })
    }

    /// Rebuild a closed descriptor from an on-disk file found by the
    /// recovery scan
    pub(crate) fn from_disk(path: PathBuf, name: ParsedName, bytes: u64) -> Self {
        Self {
            id: name.id,
            key: name.key,
            bucket: name.bucket,
            part: name.part,
            path,
            bytes,
            created_at: name.created_at,
            encoding: name.encoding,
            writer: None,
            deleted: false,
        }
    }

    /// Append one payload through the encoding.
    ///
    /// Returns the bytes written to disk after encoding, which is also what
    /// [`size`](Self::size) accumulates. Errors propagate untouched: a full
    /// disk must reach the caller, not a retry loop.
    pub fn write(&mut self, payload: &[u8]) -> Result<u64> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(SpoolError::io(
                &self.path,
                io::Error::other("file is closed"),
            ));
        };
        let n = writer
            .append(payload)
            .map_err(|e| SpoolError::io(&self.path, e))?;
        self.bytes += n;
        Ok(n)
    }

    /// Flush and close the file; idempotent
    pub fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finish()
                .map_err(|e| SpoolError::io(&self.path, e))?;
        }
        Ok(())
    }

    /// Remove the file (and a leftover recovery copy) from disk.
    /// Idempotent and safe after `close`.
    pub fn delete(&mut self) -> Result<()> {
        self.close()?;
        if self.deleted {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SpoolError::io(&self.path, e)),
        }
        if self.encoding == Encoding::Gzip {
            let copy = recovery_copy_path(&self.path);
            match fs::remove_file(&copy) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(SpoolError::io(copy, e)),
            }
        }
        self.deleted = true;
        Ok(())
    }

    /// Whether the on-disk content can be re-uploaded as is (crash path).
    ///
    /// Plain files always qualify. Gzip files qualify only when the whole
    /// stream decodes; a truncated gzip is only usable via its recovery
    /// copy.
    pub fn recoverable(&self) -> Result<bool> {
        match self.encoding {
            Encoding::None => Ok(true),
            Encoding::Gzip => {
                validate_gzip(&self.path).map_err(|e| SpoolError::io(&self.path, e))
            }
        }
    }

    /// Bytes written so far (post-encoding)
    pub fn size(&self) -> u64 {
        self.bytes
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Time since creation
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Logical key this file buffers
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Random identifier assigned at creation
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Per-key part counter
    pub fn part(&self) -> u32 {
        self.part
    }

    /// On-disk location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoding this file was written with
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the writer has been finished
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Whether the file has been removed from disk
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Canonical file name (without any recovery marker)
    pub fn file_name(&self) -> String {
        format!(
            "{FILE_TAG}.{}.{}.{:05}.{}{}",
            self.id,
            self.bucket,
            self.part,
            self.key,
            self.encoding.extension()
        )
    }

    /// Destination key for the object store:
    /// `[prefix/]key/YYYYMMDD/file_name`
    pub fn object_key(&self, prefix: Option<&str>) -> String {
        let date = &self.bucket[..8];
        let prefix = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty());
        match prefix {
            Some(p) => format!("{p}/{}/{date}/{}", self.key, self.file_name()),
            None => format!("{}/{date}/{}", self.key, self.file_name()),
        }
    }
}

impl fmt::Debug for SpoolFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpoolFile")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("bytes", &self.bytes)
            .field("encoding", &self.encoding)
            .field("closed", &self.writer.is_none())
            .field("deleted", &self.deleted)
            .finish()
    }
}

/// Fields recovered from a spool file name
#[derive(Debug, Clone)]
pub(crate) struct ParsedName {
    pub id: String,
    pub bucket: String,
    pub created_at: DateTime<Utc>,
    pub part: u32,
    pub key: String,
    pub encoding: Encoding,
    pub recovery_marker: bool,
}

/// Parse a file name against the spool grammar. Returns `None` for
/// anything this engine did not write.
pub(crate) fn parse_file_name(name: &str) -> Option<ParsedName> {
    let (name, recovery_marker) = match name.strip_suffix(RECOVERY_MARKER) {
        Some(stripped) => (stripped, true),
        None => (name, false),
    };
    let encoding = Encoding::for_file_name(name)?;
    let stem = name.strip_suffix(encoding.extension())?;

    // tag, id, bucket and part are dot-free; the key keeps the tail
    let mut fields = stem.splitn(5, '.');
    let tag = fields.next()?;
    let id = fields.next()?;
    let bucket = fields.next()?;
    let part = fields.next()?;
    let key = fields.next()?;
    if tag != FILE_TAG || id.is_empty() || key.is_empty() {
        return None;
    }

    let part = part.parse().ok()?;
    let created_at = NaiveDateTime::parse_from_str(bucket, BUCKET_FORMAT)
        .ok()?
        .and_utc();

    Some(ParsedName {
        id: id.to_string(),
        bucket: bucket.to_string(),
        created_at,
        part,
        key: key.to_string(),
        encoding,
        recovery_marker,
    })
}

/// Location of the recovery copy that belongs to `path`
pub(crate) fn recovery_copy_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(RECOVERY_MARKER);
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;
