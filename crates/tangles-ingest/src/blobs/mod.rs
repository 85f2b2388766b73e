//! Blob store contract
//!
//! The pipeline needs exactly two things from storage: read a raw upload by
//! its source reference, and write a processed image under its content
//! address unless that address is already taken.
//!
//! Dedup is signalled through [`Upload::AlreadyExists`], which a backend only
//! returns once an object with the key is stored. Concurrent uploads of one
//! key are serialised: the later one waits for the earlier sink to commit or
//! be dropped, then re-checks existence. At most one physical write results.

use async_trait::async_trait;
use std::sync::Arc;
use tangles_common::Crc32c;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::context::Context;

pub mod config;
pub mod filestore;
mod locks;
pub mod memory;

pub use config::FilestoreConfig;
pub use filestore::Filestore;
pub use memory::MemoryStore;

/// Readable handle on a stored object. Released when dropped.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Storage backend errors
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Checksum mismatch for '{key}': expected {expected}, stored {actual}")]
    ChecksumMismatch {
        key: String,
        expected: Crc32c,
        actual: Crc32c,
    },

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl BlobError {
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BlobError::Io(_) | BlobError::Backend(_) | BlobError::ChecksumMismatch { .. })
    }
}

/// Outcome of asking the store for a write handle
pub enum Upload {
    /// An object with this key is already stored; nothing needs writing
    AlreadyExists,
    /// Write the full payload, then [`BlobSink::commit`]
    Sink(Box<dyn BlobSink>),
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Upload::AlreadyExists => f.write_str("AlreadyExists"),
            Upload::Sink(_) => f.write_str("Sink(..)"),
        }
    }
}

/// Write handle for a single object.
///
/// Dropping a sink without committing discards everything written to it and
/// releases the key, so an abandoned write never becomes visible.
#[async_trait]
pub trait BlobSink: Send {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), BlobError>;

    /// Finalise the object, verifying the integrity checksum declared at
    /// upload time against what was written.
    async fn commit(self: Box<Self>) -> Result<(), BlobError>;
}

/// Fetch-by-key and content-addressed store-with-dedup
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, ctx: &Context, key: &str) -> Result<BlobReader, BlobError>;

    /// Ask for a sink to write `key`, declaring the CRC-32C of the payload
    /// that will be written.
    ///
    /// Waits while another sink for `key` is open.
    async fn upload(&self, ctx: &Context, key: &str, checksum: Crc32c) -> Result<Upload, BlobError>;
}

#[async_trait]
impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    async fn download(&self, ctx: &Context, key: &str) -> Result<BlobReader, BlobError> {
        (**self).download(ctx, key).await
    }

    async fn upload(&self, ctx: &Context, key: &str, checksum: Crc32c) -> Result<Upload, BlobError> {
        (**self).upload(ctx, key, checksum).await
    }
}

/// Reject keys that could escape the store root or address internal state
pub(crate) fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() {
        return Err(BlobError::invalid_key(key, "key is empty"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(BlobError::invalid_key(key, "key must be a relative path"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(BlobError::invalid_key(key, "empty path segment")),
            "." | ".." => return Err(BlobError::invalid_key(key, "relative path segment")),
            s if s.starts_with(".tmp") => {
                return Err(BlobError::invalid_key(key, "reserved path segment"))
            },
            _ => {},
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("uploads/abc123").is_ok());
        assert!(validate_key("d41d8cd9.png").is_ok());

        for bad in ["", "/etc/passwd", "../escape", "a//b", "a/./b", ".tmp/x", "a\\b"] {
            assert!(
                matches!(validate_key(bad), Err(BlobError::InvalidKey { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(!BlobError::NotFound("x".into()).is_transient());
        assert!(!BlobError::invalid_key("x", "bad").is_transient());
        assert!(BlobError::Io(std::io::Error::other("reset")).is_transient());
    }
}
