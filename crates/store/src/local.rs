//! Local-directory object store
//!
//! Mirrors each destination key as a relative path under a base directory.
//! Used for development, drain-to-volume deployments, and end-to-end tests
//! that want real files without a network.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::ObjectStore;
use crate::error::{Result, StoreError};
use crate::options::PutOptions;

/// Object store backed by a local directory
pub struct LocalStore {
    base: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `base`, creating the directory if needed
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base).map_err(|e| StoreError::io(&base, e))?;
        Ok(Self { base })
    }

    /// Base directory objects are written under
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a destination key to a path under the base directory
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(StoreError::upload(key, "invalid destination key"));
        }
        Ok(self.base.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, path: &Path, key: &str, _opts: &PutOptions) -> Result<()> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let bytes = fs::copy(path, &dest)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        debug!(key = %key, bytes = bytes, "stored object");
        Ok(())
    }

    async fn put_multipart(&self, path: &Path, key: &str, opts: &PutOptions) -> Result<()> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let mut src = fs::File::open(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        let mut dst = fs::File::create(&dest)
            .await
            .map_err(|e| StoreError::io(&dest, e))?;

        let chunk = opts.multipart_chunk_size.max(1) as usize;
        let mut buf = vec![0u8; chunk];
        let mut parts = 0u32;
        let mut total = 0u64;
        loop {
            let n = src
                .read(&mut buf)
                .await
                .map_err(|e| StoreError::io(path, e))?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n])
                .await
                .map_err(|e| StoreError::io(&dest, e))?;
            parts += 1;
            total += n as u64;
        }
        dst.flush().await.map_err(|e| StoreError::io(&dest, e))?;
        debug!(key = %key, parts = parts, bytes = total, "stored multipart object");
        Ok(())
    }
}
