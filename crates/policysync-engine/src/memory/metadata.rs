//! In-memory local metadata store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use policysync_core::BucketName;
use tracing::debug;

use crate::store::{MetadataStore, MetadataStoreError};

/// Metadata store keyed by `(bucket, config key)`.
pub struct MemoryMetadataStore {
    entries: DashMap<(String, String), Bytes>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl std::fmt::Debug for MemoryMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMetadataStore")
            .field("entry_count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMetadataStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Current value under `(bucket, key)`, without counting as a read.
    #[must_use]
    pub fn get(&self, bucket: &BucketName, key: &str) -> Option<Bytes> {
        self.entries.get(&entry_key(bucket, key)).map(|v| v.clone())
    }

    /// Number of `read` calls so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `write` and `delete` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent writes and deletes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), MetadataStoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(MetadataStoreError::Unavailable("write failure injected".to_owned()));
        }
        Ok(())
    }
}

fn entry_key(bucket: &BucketName, key: &str) -> (String, String) {
    (bucket.as_str().to_owned(), key.to_owned())
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn write(
        &self,
        bucket: &BucketName,
        key: &str,
        data: Bytes,
    ) -> Result<DateTime<Utc>, MetadataStoreError> {
        self.check_writable()?;
        self.entries.insert(entry_key(bucket, key), data);
        let now = Utc::now();
        debug!(bucket = %bucket, key, "metadata written");
        Ok(now)
    }

    async fn read(
        &self,
        bucket: &BucketName,
        key: &str,
    ) -> Result<Option<Bytes>, MetadataStoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(MetadataStoreError::Unavailable("read failure injected".to_owned()));
        }
        Ok(self.get(bucket, key))
    }

    async fn delete(
        &self,
        bucket: &BucketName,
        key: &str,
    ) -> Result<DateTime<Utc>, MetadataStoreError> {
        self.check_writable()?;
        self.entries.remove(&entry_key(bucket, key));
        debug!(bucket = %bucket, key, "metadata deleted");
        Ok(Utc::now())
    }
}
