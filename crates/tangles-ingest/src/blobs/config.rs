use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default root for the filesystem blob store.
pub const DEFAULT_STORE_ROOT: &str = "./tangles-store";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilestoreConfig {
    /// Directory holding both raw uploads and processed images
    pub root: PathBuf,

    /// Whether commits fsync the object before publishing it
    pub sync_on_commit: bool,
}

impl FilestoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sync_on_commit: true,
        }
    }

    pub fn from_env() -> Self {
        Self {
            root: env::var("TANGLES_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_ROOT)),
            sync_on_commit: env::var("TANGLES_STORE_SYNC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }

    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}

impl Default for FilestoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_ROOT)
    }
}
