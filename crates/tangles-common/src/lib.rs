//! Tangles Common Library
//!
//! Shared types, content hashing, and logging used by every Tangles crate.
//!
//! # Overview
//!
//! - **Content Identity**: SHA-256 content digests and CRC-32C integrity checksums
//! - **Types**: source references, storage keys, and processed image records
//! - **Error Handling**: validation errors for the shared types
//! - **Logging**: `tracing` subscriber setup shared by the binaries
//!
//! # Example
//!
//! ```
//! use tangles_common::{ContentHasher, ImageMetadata, ProcessedImage, SourceRef};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hasher = ContentHasher::new();
//! let output = b"processed bytes";
//!
//! let metadata = ImageMetadata::new("png")?;
//! let sha256 = hasher.digest(output)?;
//! let image = ProcessedImage::new(metadata, sha256, SourceRef::new("uploads/abc123")?);
//!
//! assert!(image.storage_key().as_str().ends_with(".png"));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod hash;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TanglesError};
pub use hash::{ContentHasher, HashError, RunningChecksum};
pub use types::{
    ContentDigest, Crc32c, Extension, ImageMetadata, ProcessedImage, SourceRef, StorageKey,
};
