//! Spool file encodings
//!
//! A spool file is append-only: every `append` lands one complete encoded
//! unit on disk. Plain encoding appends the payload verbatim. Gzip encoding
//! compresses each payload as an independent gzip member and appends the
//! whole member, so the file is a valid multi-member gzip stream between
//! any two appends; only a crash inside an append can truncate it.
//!
//! The gzip writer also maintains the recovery copy: each member goes to
//! the copy before the primary, which keeps the copy a complete superset of
//! the primary's fully-written members. A clean close deletes the copy.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use crate::file::recovery_copy_path;

/// File extension for plain spool files
pub const PLAIN_EXT: &str = ".log";

/// File extension for gzip spool files
pub const GZIP_EXT: &str = ".log.gz";

/// On-disk encoding of a spool file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Payloads appended verbatim
    #[default]
    None,
    /// One gzip member per append
    Gzip,
}

impl Encoding {
    /// File extension for this encoding
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => PLAIN_EXT,
            Self::Gzip => GZIP_EXT,
        }
    }

    /// Natural Content-Encoding header value, if any
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("gzip"),
        }
    }

    /// Encoding implied by a file name, judged by its extension
    pub fn for_file_name(name: &str) -> Option<Self> {
        if name.ends_with(GZIP_EXT) {
            Some(Self::Gzip)
        } else if name.ends_with(PLAIN_EXT) {
            Some(Self::None)
        } else {
            None
        }
    }

    /// Wrap a freshly created spool file in the matching writer.
    /// `path` is the file's own path; the gzip writer derives the recovery
    /// copy location from it.
    pub(crate) fn writer(&self, file: File, path: &Path) -> Box<dyn SpoolWrite> {
        match self {
            Self::None => Box::new(PlainWriter { file }),
            Self::Gzip => Box::new(GzipWriter {
                primary: file,
                copy_path: recovery_copy_path(path),
                copy: None,
            }),
        }
    }
}

/// Writer for one open spool file
pub(crate) trait SpoolWrite: Send + Sync {
    /// Append one payload; returns the bytes written to disk after encoding
    fn append(&mut self, payload: &[u8]) -> io::Result<u64>;

    /// Finish the file. For gzip this also removes the recovery copy,
    /// since the primary is now complete.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

struct PlainWriter {
    file: File,
}

impl SpoolWrite for PlainWriter {
    fn append(&mut self, payload: &[u8]) -> io::Result<u64> {
        self.file.write_all(payload)?;
        Ok(payload.len() as u64)
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

struct GzipWriter {
    primary: File,
    copy_path: PathBuf,
    copy: Option<File>,
}

impl SpoolWrite for GzipWriter {
    fn append(&mut self, payload: &[u8]) -> io::Result<u64> {
        let member = gzip_member(payload)?;

        // Copy first: the copy must never miss a member the primary has
        let copy = match &mut self.copy {
            Some(copy) => copy,
            slot @ None => slot.insert(File::create(&self.copy_path)?),
        };
        copy.write_all(&member)?;
        self.primary.write_all(&member)?;
        Ok(member.len() as u64)
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        if self.copy.is_none() {
            return Ok(());
        }
        match fs::remove_file(&self.copy_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Compress one payload into a standalone gzip member
fn gzip_member(payload: &[u8]) -> io::Result<Vec<u8>> {
    let capacity = payload.len() / 2 + 64;
    let mut encoder = GzEncoder::new(Vec::with_capacity(capacity), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

/// Whether `path` holds a well-formed (multi-member) gzip stream.
///
/// Decodes the whole file; a short or corrupt stream reports `false`, an
/// unreadable file reports the I/O error. An empty file is trivially valid.
pub fn validate_gzip(path: &Path) -> io::Result<bool> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    match io::copy(&mut decoder, &mut io::sink()) {
        Ok(_) => Ok(true),
        Err(e) if matches!(
            e.kind(),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof
        ) =>
        {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Decode a gzip spool file back into its payload bytes
#[cfg(test)]
pub(crate) fn decode_gzip(path: &Path) -> io::Result<Vec<u8>> {
    use std::io::Read;

    let file = File::open(path)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn open_writer(dir: &TempDir, name: &str, encoding: Encoding) -> (Box<dyn SpoolWrite>, PathBuf) {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        (encoding.writer(file, &path), path)
    }

    #[test]
    fn test_plain_append_is_verbatim() {
        let dir = TempDir::new().unwrap();
        let (mut writer, path) = open_writer(&dir, "a.log", Encoding::None);

        assert_eq!(writer.append(b"one").unwrap(), 3);
        assert_eq!(writer.append(b"two").unwrap(), 3);
        writer.finish().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"onetwo");
    }

    #[test]
    fn test_gzip_members_concatenate() {
        let dir = TempDir::new().unwrap();
        let (mut writer, path) = open_writer(&dir, "a.log.gz", Encoding::Gzip);

        let n1 = writer.append(b"hello ").unwrap();
        let n2 = writer.append(b"world").unwrap();
        writer.finish().unwrap();

        // Byte accounting is post-encoding and matches what is on disk
        assert_eq!(n1 + n2, fs::metadata(&path).unwrap().len());
        assert_eq!(decode_gzip(&path).unwrap(), b"hello world");
        assert!(validate_gzip(&path).unwrap());
    }

    #[test]
    fn test_gzip_copy_tracks_primary_and_close_removes_it() {
        let dir = TempDir::new().unwrap();
        let (mut writer, path) = open_writer(&dir, "a.log.gz", Encoding::Gzip);
        let copy = recovery_copy_path(&path);

        writer.append(b"payload").unwrap();
        assert!(copy.exists());
        assert_eq!(fs::read(&copy).unwrap(), fs::read(&path).unwrap());

        writer.finish().unwrap();
        assert!(!copy.exists());
        assert!(path.exists());
    }

    #[test]
    fn test_gzip_file_stays_valid_between_appends() {
        let dir = TempDir::new().unwrap();
        let (mut writer, path) = open_writer(&dir, "a.log.gz", Encoding::Gzip);

        writer.append(b"first").unwrap();
        assert!(validate_gzip(&path).unwrap());
        writer.append(b"second").unwrap();
        assert!(validate_gzip(&path).unwrap());
        assert_eq!(decode_gzip(&path).unwrap(), b"firstsecond");
    }

    #[test]
    fn test_validate_rejects_truncated_stream() {
        let dir = TempDir::new().unwrap();
        let (mut writer, path) = open_writer(&dir, "a.log.gz", Encoding::Gzip);
        writer.append(b"some payload that compresses").unwrap();
        writer.finish().unwrap();

        // Chop the trailer off the single member
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 5]).unwrap();
        assert!(!validate_gzip(&path).unwrap());
    }

    #[test]
    fn test_validate_accepts_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.log.gz");
        File::create(&path).unwrap();
        assert!(validate_gzip(&path).unwrap());
    }

    #[test]
    fn test_extension_lookup() {
        assert_eq!(Encoding::for_file_name("x.log"), Some(Encoding::None));
        assert_eq!(Encoding::for_file_name("x.log.gz"), Some(Encoding::Gzip));
        assert_eq!(Encoding::for_file_name("x.tmp"), None);
    }
}
