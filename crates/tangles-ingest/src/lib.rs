//! Tangles Ingest Library
//!
//! The image ingestion pipeline and the contracts it is wired through.
//!
//! # Components
//!
//! - **Blob stores** ([`blobs`]): fetch raw uploads, store processed images
//!   under content addresses with dedup
//! - **Transformers** ([`images`]): raw upload → stored bytes + metadata
//! - **Pipeline** ([`pipeline`]): fetch, transform, digest, checksum, store
//! - **Event sources** ([`events`]): deliver source references to the pipeline
//!   with bounded concurrency and redelivery
//!
//! # Example
//!
//! ```
//! use tangles_common::{ContentHasher, SourceRef};
//! use tangles_ingest::{Context, MemoryStore, Passthrough, Pipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hasher = ContentHasher::new();
//! let store = MemoryStore::new(hasher.clone());
//! store.insert("uploads/abc123", b"GIF89a\x01\x00\x01\x00".to_vec());
//!
//! let pipeline = Pipeline::new(store.clone(), Passthrough::new(), hasher);
//! let image = pipeline
//!     .process(&Context::background(), &SourceRef::new("uploads/abc123")?)
//!     .await?;
//!
//! assert!(store.contains(image.storage_key().as_str()));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod blobs;
pub mod context;
pub mod events;
pub mod images;
pub mod pipeline;

pub use blobs::{
    BlobError, BlobReader, BlobSink, BlobStore, Filestore, FilestoreConfig, MemoryStore, Upload,
};
pub use context::{Cancelled, Context};
pub use events::{
    channel, ChannelListener, Handler, ListenError, ListenStats, Listener, ListenerConfig,
    Publisher,
};
pub use images::{ImageFormat, Passthrough, TransformError, Transformer};
pub use pipeline::{Pipeline, PipelineError};
