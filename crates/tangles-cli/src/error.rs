//! Error types for tanglesd
//!
//! User-facing errors with messages that say what to check next.

use tangles_ingest::{BlobError, ListenError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables and .env file.")]
    Config(String),

    /// The blob store could not be opened
    #[error("Blob store error: {0}. Check that the store root exists and is writable.")]
    Store(#[from] BlobError),

    /// The event listener could not run
    #[error("Listener error: {0}")]
    Listen(#[from] ListenError),

    /// One or more sources could not be processed
    #[error("{failed} of {delivered} source(s) failed to process. Run with --verbose for details.")]
    ProcessingFailed { failed: u64, delivered: u64 },

    /// File system or stdin operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("Network request failed: {0}. Check your internet connection and the updates feed URL.")]
    Http(#[from] reqwest::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}
