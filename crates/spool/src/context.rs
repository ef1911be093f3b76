//! Per-key file context
//!
//! Owns the single current [`SpoolFile`] for one logical key and the
//! monotonically increasing part counter. Exclusive access is the
//! repository's job; a context itself is plain mutable state.

use std::path::PathBuf;
use std::sync::Arc;

use crate::encoding::Encoding;
use crate::error::Result;
use crate::file::SpoolFile;

/// Factory for one logical key's spool files
pub struct FileContext {
    key: Arc<str>,
    dir: PathBuf,
    encoding: Encoding,
    next_part: u32,
    current: Option<SpoolFile>,
}

impl FileContext {
    pub(crate) fn new(key: Arc<str>, dir: PathBuf, encoding: Encoding) -> Self {
        Self {
            key,
            dir,
            encoding,
            next_part: 0,
            current: None,
        }
    }

    /// Key this context buffers for
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The current file, created lazily on first access
    pub fn current(&mut self) -> Result<&mut SpoolFile> {
        match &mut self.current {
            Some(file) => Ok(file),
            slot @ None => {
                let file =
                    SpoolFile::create(&self.dir, &self.key, self.next_part, self.encoding)?;
                self.next_part += 1;
                Ok(slot.insert(file))
            }
        }
    }

    /// The current file if one exists, without creating it
    pub fn live(&mut self) -> Option<&mut SpoolFile> {
        self.current.as_mut()
    }

    /// Atomically swap out the current file when `pred` approves it.
    ///
    /// The old file is closed and returned; a fresh file is already
    /// installed before this returns, so a concurrent writer (serialized
    /// behind the same lock) never observes a half-rotated state.
    pub fn rotate_if(
        &mut self,
        pred: impl FnOnce(&SpoolFile) -> bool,
    ) -> Result<Option<SpoolFile>> {
        let rotate = match &self.current {
            Some(file) => pred(file),
            None => false,
        };
        if !rotate {
            return Ok(None);
        }

        let fresh = SpoolFile::create(&self.dir, &self.key, self.next_part, self.encoding)?;
        self.next_part += 1;
        let mut old = self.current.replace(fresh);
        if let Some(file) = old.as_mut() {
            file.close()?;
        }
        Ok(old)
    }

    /// Close and take the current file without starting a new one
    /// (final drain)
    pub fn detach(&mut self) -> Result<Option<SpoolFile>> {
        let mut old = self.current.take();
        if let Some(file) = old.as_mut() {
            file.close()?;
        }
        Ok(old)
    }
}
