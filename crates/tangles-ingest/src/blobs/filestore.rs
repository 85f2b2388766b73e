//! Local filesystem blob store
//!
//! Objects live at `<root>/<key>`. Writes go to a temp file under
//! `<root>/.tmp/`, are verified against the declared CRC-32C by re-reading
//! what landed on disk, and are then published with a no-clobber hard link.
//!
//! Concurrent uploads of one key inside this process are serialised by a
//! per-key write lock; across processes the no-clobber link keeps the first
//! published copy.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tangles_common::{ContentHasher, Crc32c};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::locks::{KeyGuard, KeyLocks};
use super::{validate_key, BlobError, BlobReader, BlobSink, BlobStore, FilestoreConfig, Upload};
use crate::context::Context;

const TEMP_DIR: &str = ".tmp";

#[derive(Clone)]
pub struct Filestore {
    root: PathBuf,
    sync_on_commit: bool,
    hasher: ContentHasher,
    locks: KeyLocks,
}

impl Filestore {
    pub async fn new(config: FilestoreConfig, hasher: ContentHasher) -> Result<Self, BlobError> {
        fs::create_dir_all(config.root.join(TEMP_DIR)).await?;

        info!(root = %config.root.display(), "Filestore initialized");

        Ok(Self {
            root: config.root,
            sync_on_commit: config.sync_on_commit,
            hasher,
            locks: KeyLocks::default(),
        })
    }

    /// Filesystem path for `key`, after validating it stays inside the root
    pub fn object_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    pub async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(fs::try_exists(self.object_path(key)?).await?)
    }
}

impl std::fmt::Debug for Filestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filestore").field("root", &self.root).finish()
    }
}

#[async_trait]
impl BlobStore for Filestore {
    #[instrument(skip(self, _ctx), fields(root = %self.root.display()))]
    async fn download(&self, _ctx: &Context, key: &str) -> Result<BlobReader, BlobError> {
        let path = self.object_path(key)?;

        match fs::File::open(&path).await {
            Ok(file) => {
                debug!(path = %path.display(), "Opened object for reading");
                Ok(Box::new(BufReader::new(file)))
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, _ctx, checksum), fields(root = %self.root.display(), checksum = %checksum))]
    async fn upload(&self, _ctx: &Context, key: &str, checksum: Crc32c) -> Result<Upload, BlobError> {
        let final_path = self.object_path(key)?;

        let guard = self.locks.acquire(key).await?;

        if fs::try_exists(&final_path).await? {
            debug!("Object already stored");
            return Ok(Upload::AlreadyExists);
        }

        let temp_path = self.root.join(TEMP_DIR).join(format!("{}.part", Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await?;

        Ok(Upload::Sink(Box::new(FileSink {
            key: key.to_string(),
            file: Some(file),
            temp_path,
            final_path,
            expected: checksum,
            hasher: self.hasher.clone(),
            sync_on_commit: self.sync_on_commit,
            temp_removed: false,
            _guard: guard,
        })))
    }
}

struct FileSink {
    key: String,
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    expected: Crc32c,
    hasher: ContentHasher,
    sync_on_commit: bool,
    temp_removed: bool,
    _guard: KeyGuard,
}

impl FileSink {
    fn closed(&self) -> BlobError {
        BlobError::Backend(format!("sink for '{}' is already closed", self.key))
    }

    async fn stored_checksum(&self) -> Result<Crc32c, BlobError> {
        let mut file = fs::File::open(&self.temp_path).await?;
        let mut running = self.hasher.running_checksum();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let bytes_read = file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            running.update(&buffer[..bytes_read]);
        }

        Ok(running.finish())
    }
}

#[async_trait]
impl BlobSink for FileSink {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), BlobError> {
        let Some(file) = self.file.as_mut() else {
            return Err(self.closed());
        };
        file.write_all(buf).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BlobError> {
        let mut sink = self;
        let Some(mut file) = sink.file.take() else {
            return Err(sink.closed());
        };

        file.flush().await?;
        if sink.sync_on_commit {
            file.sync_all().await?;
        }
        drop(file);

        let actual = sink.stored_checksum().await?;
        if actual != sink.expected {
            warn!(key = %sink.key, expected = %sink.expected, actual = %actual, "Discarding corrupt write");
            return Err(BlobError::ChecksumMismatch {
                key: sink.key.clone(),
                expected: sink.expected,
                actual,
            });
        }

        if let Some(parent) = sink.final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::hard_link(&sink.temp_path, &sink.final_path).await {
            Ok(()) => info!(key = %sink.key, "Committed object"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(key = %sink.key, "Object was published concurrently, keeping existing copy")
            },
            Err(e) => return Err(e.into()),
        }

        match fs::remove_file(&sink.temp_path).await {
            Ok(()) => sink.temp_removed = true,
            Err(e) => warn!(path = %sink.temp_path.display(), error = %e, "Failed to remove temp file"),
        }

        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if !self.temp_removed {
            // Uncommitted or partially cleaned up; the object itself is either
            // published already or was never visible.
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, Filestore) {
        let dir = TempDir::new().unwrap();
        let config = FilestoreConfig::new(dir.path()).with_sync_on_commit(false);
        let store = Filestore::new(config, ContentHasher::new()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_temp_dir_created() {
        let (dir, _store) = store().await;
        assert!(dir.path().join(TEMP_DIR).is_dir());
    }

    #[tokio::test]
    async fn test_object_path_stays_inside_root() {
        let (dir, store) = store().await;
        assert_eq!(store.object_path("ab.png").unwrap(), dir.path().join("ab.png"));
        assert!(store.object_path("../ab.png").is_err());
    }
}
