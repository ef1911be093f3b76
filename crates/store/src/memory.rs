//! In-memory object store
//!
//! Keeps uploaded objects in a map for inspection and supports failure
//! injection, which is what the retry and recovery tests are built on.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;

use crate::ObjectStore;
use crate::error::{Result, StoreError};
use crate::options::PutOptions;

/// One stored object with the options it was uploaded under
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub options: PutOptions,
    pub multipart: bool,
}

/// Object store backed by an in-memory map
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<String, StoredObject>,
    fail_remaining: AtomicU32,
    attempts: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` put attempts fail
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::Release);
    }

    /// Total put attempts seen, including injected failures
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Content of the object stored under `key`, if present
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|o| o.data.clone())
    }

    /// Full record of the object stored under `key`, if present
    pub fn stored(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|o| o.clone())
    }

    /// Sorted list of stored keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|o| o.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    async fn store_object(
        &self,
        path: &Path,
        key: &str,
        opts: &PutOptions,
        multipart: bool,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::AcqRel);

        // Consume one injected failure if any remain
        let injected = self
            .fail_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::upload(key, "injected failure"));
        }

        let data = fs::read(path).await.map_err(|e| StoreError::io(path, e))?;
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                options: opts.clone(),
                multipart,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, path: &Path, key: &str, opts: &PutOptions) -> Result<()> {
        self.store_object(path, key, opts, false).await
    }

    async fn put_multipart(&self, path: &Path, key: &str, opts: &PutOptions) -> Result<()> {
        self.store_object(path, key, opts, true).await
    }
}
