//! Test helpers for tangles-ingest integration tests
//!
//! This module provides:
//! - A blob store wrapper that counts calls and reader releases
//! - A blob store whose sinks fail while writing or corrupt the payload
//! - Transformers with fixed, failing, and never-finishing behaviour
//! - Tracing setup for test output

#![allow(dead_code)]

use async_trait::async_trait;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tangles_common::{ContentHasher, Crc32c, ImageMetadata};
use tangles_ingest::{
    BlobError, BlobReader, BlobSink, BlobStore, Context, MemoryStore, TransformError, Transformer, Upload,
};
use tokio::io::{AsyncRead, ReadBuf};

/// SHA-256 of `hello world`
pub const HELLO_DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tangles_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Blob store
// ============================================================================

/// Wraps a [`MemoryStore`], counting calls and reader drops
#[derive(Clone, Default)]
pub struct TrackingStore {
    pub inner: MemoryStore,
    pub downloads: Arc<AtomicUsize>,
    pub uploads: Arc<AtomicUsize>,
    pub readers_released: Arc<AtomicUsize>,
}

impl TrackingStore {
    pub fn new(hasher: ContentHasher) -> Self {
        Self {
            inner: MemoryStore::new(hasher),
            ..Self::default()
        }
    }

    pub fn seed(&self, key: &str, data: &[u8]) {
        self.inner.insert(key, data.to_vec());
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.readers_released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for TrackingStore {
    async fn download(&self, ctx: &Context, key: &str) -> Result<BlobReader, BlobError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let reader = self.inner.download(ctx, key).await?;
        Ok(Box::new(ReleaseCounter {
            inner: reader,
            released: Arc::clone(&self.readers_released),
        }))
    }

    async fn upload(&self, ctx: &Context, key: &str, checksum: Crc32c) -> Result<Upload, BlobError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.inner.upload(ctx, key, checksum).await
    }
}

/// Reader that bumps a counter when dropped
struct ReleaseCounter {
    inner: BlobReader,
    released: Arc<AtomicUsize>,
}

impl AsyncRead for ReleaseCounter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for ReleaseCounter {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store whose uploads never resolve
pub struct StalledStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl BlobStore for StalledStore {
    async fn download(&self, ctx: &Context, key: &str) -> Result<BlobReader, BlobError> {
        self.inner.download(ctx, key).await
    }

    async fn upload(&self, _ctx: &Context, _key: &str, _checksum: Crc32c) -> Result<Upload, BlobError> {
        std::future::pending().await
    }
}

/// How a [`FaultySinkStore`] sink misbehaves
#[derive(Debug, Clone, Copy)]
pub enum SinkFault {
    /// `write_all` fails with an I/O error
    Write,
    /// Bytes are flipped on the way in, so commit sees a CRC mismatch
    Corrupt,
}

/// Wraps a [`MemoryStore`] and hands out sinks that fail
#[derive(Clone)]
pub struct FaultySinkStore {
    pub inner: MemoryStore,
    pub fault: SinkFault,
}

impl FaultySinkStore {
    pub fn new(hasher: ContentHasher, fault: SinkFault) -> Self {
        Self {
            inner: MemoryStore::new(hasher),
            fault,
        }
    }
}

#[async_trait]
impl BlobStore for FaultySinkStore {
    async fn download(&self, ctx: &Context, key: &str) -> Result<BlobReader, BlobError> {
        self.inner.download(ctx, key).await
    }

    async fn upload(&self, ctx: &Context, key: &str, checksum: Crc32c) -> Result<Upload, BlobError> {
        match self.inner.upload(ctx, key, checksum).await? {
            Upload::Sink(sink) => Ok(Upload::Sink(Box::new(FaultySink {
                inner: sink,
                fault: self.fault,
            }))),
            Upload::AlreadyExists => Ok(Upload::AlreadyExists),
        }
    }
}

struct FaultySink {
    inner: Box<dyn BlobSink>,
    fault: SinkFault,
}

#[async_trait]
impl BlobSink for FaultySink {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), BlobError> {
        match self.fault {
            SinkFault::Write => Err(BlobError::Io(std::io::Error::other("disk full"))),
            SinkFault::Corrupt => {
                let flipped: Vec<u8> = buf.iter().map(|b| b ^ 0xff).collect();
                self.inner.write_all(&flipped).await
            },
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), BlobError> {
        self.inner.commit().await
    }
}

// ============================================================================
// Transformers
// ============================================================================

/// Ignores its input and always yields the same image
pub struct FixedTransformer {
    pub extension: &'static str,
    pub output: Vec<u8>,
    pub calls: AtomicUsize,
}

impl FixedTransformer {
    pub fn new(extension: &'static str, output: &[u8]) -> Self {
        Self {
            extension,
            output: output.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    /// The `hello world` PNG used by most scenarios
    pub fn hello_png() -> Self {
        Self::new("png", b"hello world")
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transformer for FixedTransformer {
    async fn process(
        &self,
        _ctx: &Context,
        _reader: BlobReader,
    ) -> Result<(ImageMetadata, Vec<u8>), TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((ImageMetadata::new(self.extension)?, self.output.clone()))
    }
}

/// Always rejects its input
pub struct FailingTransformer;

#[async_trait]
impl Transformer for FailingTransformer {
    async fn process(
        &self,
        _ctx: &Context,
        _reader: BlobReader,
    ) -> Result<(ImageMetadata, Vec<u8>), TransformError> {
        Err(TransformError::Malformed("truncated header".to_string()))
    }
}

/// Holds the reader and never finishes
pub struct StalledTransformer;

#[async_trait]
impl Transformer for StalledTransformer {
    async fn process(
        &self,
        _ctx: &Context,
        reader: BlobReader,
    ) -> Result<(ImageMetadata, Vec<u8>), TransformError> {
        let _held = reader;
        std::future::pending().await
    }
}
