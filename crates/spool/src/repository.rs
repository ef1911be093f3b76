//! Key-to-context repository
//!
//! The single piece of shared mutable state in the engine: a concurrent
//! map from logical key to that key's [`FileContext`], each behind its own
//! async mutex. Locking is per key, so writers to different keys never
//! contend; the lock spans both the write and the read-then-rotate that
//! follows it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::context::FileContext;
use crate::encoding::Encoding;
use crate::error::{Result, SpoolError};
use crate::file::SpoolFile;

/// Concurrent map of logical key to file context
pub struct FileRepository {
    contexts: DashMap<Arc<str>, Arc<Mutex<FileContext>>>,
    dir: PathBuf,
    encoding: Encoding,
    closed: AtomicBool,
}

impl FileRepository {
    /// Create a repository spooling under `dir` with the given encoding
    pub fn new(dir: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            contexts: DashMap::new(),
            dir: dir.into(),
            encoding,
            closed: AtomicBool::new(false),
        }
    }

    /// Directory spool files are created under
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of known keys
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no key has been seen yet
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Snapshot of all known keys
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.contexts.iter().map(|e| Arc::clone(e.key())).collect()
    }

    /// Stop handing out contexts for new writes; drain paths stay open
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn context(&self, key: &str) -> Result<Arc<Mutex<FileContext>>> {
        if self.is_closed() {
            return Err(SpoolError::Closed);
        }
        if let Some(ctx) = self.contexts.get(key) {
            return Ok(Arc::clone(ctx.value()));
        }
        // entry() arbitrates racing creators of an unseen key
        let key: Arc<str> = Arc::from(key);
        let ctx = self.contexts.entry(Arc::clone(&key)).or_insert_with(|| {
            Arc::new(Mutex::new(FileContext::new(
                key,
                self.dir.clone(),
                self.encoding,
            )))
        });
        Ok(Arc::clone(ctx.value()))
    }

    /// Run `f` against the key's current file under the key's lock,
    /// creating context and file on demand
    pub async fn with_file<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut SpoolFile) -> Result<T>,
    ) -> Result<T> {
        let ctx = self.context(key)?;
        let mut guard = ctx.lock().await;
        f(guard.current()?)
    }

    /// Run `f` against each named key's context (if it exists) under that
    /// key's lock. Used by the rotation sweep and the final drain.
    pub async fn with_factories<I, F>(&self, keys: I, mut f: F) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: FnMut(&mut FileContext) -> Result<()>,
    {
        for key in keys {
            let Some(ctx) = self
                .contexts
                .get(key.as_ref())
                .map(|e| Arc::clone(e.value()))
            else {
                continue;
            };
            let mut guard = ctx.lock().await;
            f(&mut guard)?;
        }
        Ok(())
    }

    /// Visit every live file across all keys.
    pub async fn each_file<F>(&self, mut f: F)
    where
        F: FnMut(&mut SpoolFile),
    {
        // Clone the handles out first; a dashmap shard guard must not be
        // held across an await
        let contexts: Vec<_> = self
            .contexts
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for ctx in contexts {
            let mut guard = ctx.lock().await;
            if let Some(file) = guard.live() {
                f(file);
            }
        }
    }
}

#[cfg(test)]
#[path = "repository_test.rs"]
mod repository_test;
