//! Image transformation contract
//!
//! A [`Transformer`] turns a raw upload into the bytes that get stored plus
//! the metadata describing them. The pipeline surfaces its errors verbatim and
//! never retries or repairs a failed transformation.

use async_trait::async_trait;
use std::sync::Arc;
use tangles_common::{ImageMetadata, TanglesError};
use thiserror::Error;

use crate::blobs::BlobReader;
use crate::context::{Cancelled, Context};

pub mod passthrough;

pub use passthrough::{ImageFormat, Passthrough};

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Malformed image: {0}")]
    Malformed(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("Invalid image metadata: {0}")]
    InvalidMetadata(#[from] TanglesError),

    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transformation interrupted: {0}")]
    Interrupted(#[from] Cancelled),

    #[error("Transformer fault: {0}")]
    Internal(String),
}

#[async_trait]
pub trait Transformer: Send + Sync {
    /// Consume `reader` and produce the metadata and bytes to store.
    ///
    /// The reader is owned by the call and dropped when it returns, whatever
    /// the outcome.
    async fn process(
        &self,
        ctx: &Context,
        reader: BlobReader,
    ) -> Result<(ImageMetadata, Vec<u8>), TransformError>;
}

#[async_trait]
impl<T: Transformer + ?Sized> Transformer for Arc<T> {
    async fn process(
        &self,
        ctx: &Context,
        reader: BlobReader,
    ) -> Result<(ImageMetadata, Vec<u8>), TransformError> {
        (**self).process(ctx, reader).await
    }
}
