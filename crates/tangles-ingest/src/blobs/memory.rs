//! In-memory blob store for tests and dry runs

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tangles_common::{ContentHasher, Crc32c};
use tracing::debug;

use super::locks::{KeyGuard, KeyLocks};
use super::{validate_key, BlobError, BlobReader, BlobSink, BlobStore, Upload};
use crate::context::Context;

/// Object map guarded by a mutex. Cloning shares the same objects.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<HashMap<String, Arc<[u8]>>>>,
    locks: KeyLocks,
    hasher: ContentHasher,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new(hasher: ContentHasher) -> Self {
        Self {
            objects: Arc::default(),
            locks: KeyLocks::default(),
            hasher,
            writes: Arc::default(),
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object directly, bypassing the upload path
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.objects().insert(key.into(), data.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects().get(key).map(|data| data.to_vec())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of committed uploads
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("objects", &self.len())
            .field("writes", &self.write_count())
            .finish()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn download(&self, _ctx: &Context, key: &str) -> Result<BlobReader, BlobError> {
        validate_key(key)?;
        let data = self
            .objects()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn upload(&self, _ctx: &Context, key: &str, checksum: Crc32c) -> Result<Upload, BlobError> {
        validate_key(key)?;

        let guard = self.locks.acquire(key).await?;
        if self.contains(key) {
            debug!(key, "Object already stored");
            return Ok(Upload::AlreadyExists);
        }

        Ok(Upload::Sink(Box::new(MemorySink {
            key: key.to_string(),
            buffer: Vec::new(),
            expected: checksum,
            store: self.clone(),
            _guard: guard,
        })))
    }
}

struct MemorySink {
    key: String,
    buffer: Vec<u8>,
    expected: Crc32c,
    store: MemoryStore,
    _guard: KeyGuard,
}

#[async_trait]
impl BlobSink for MemorySink {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), BlobError> {
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BlobError> {
        let mut sink = self;
        let actual = sink.store.hasher.checksum(&sink.buffer);
        if actual != sink.expected {
            return Err(BlobError::ChecksumMismatch {
                key: sink.key.clone(),
                expected: sink.expected,
                actual,
            });
        }

        let data = std::mem::take(&mut sink.buffer);
        sink.store.objects().insert(sink.key.clone(), data.into());
        sink.store.writes.fetch_add(1, Ordering::SeqCst);
        debug!(key = %sink.key, "Committed object");
        Ok(())
    }
}
