//! Ingestion orchestrator
//!
//! For one source reference: fetch the raw upload, transform it, digest the
//! output, checksum it, and store it under its content address unless an
//! identical image is already there. Each step is terminal on failure and the
//! pipeline keeps no state between invocations.

use async_trait::async_trait;
use tangles_common::{ContentHasher, HashError, ProcessedImage, SourceRef};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::blobs::{BlobError, BlobStore, Upload};
use crate::context::{Cancelled, Context};
use crate::events::Handler;
use crate::images::{TransformError, Transformer};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to fetch source: {0}")]
    Fetch(#[source] BlobError),

    #[error("Failed to transform image: {0}")]
    Transform(#[source] TransformError),

    #[error("Failed to digest image: {0}")]
    Hash(#[from] HashError),

    #[error("Failed to store image: {0}")]
    Store(#[source] BlobError),

    #[error("Pipeline interrupted: {0}")]
    Cancelled(#[from] Cancelled),
}

impl PipelineError {
    /// Whether redelivering the same source could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Fetch(e) => e.is_transient(),
            PipelineError::Transform(_) | PipelineError::Hash(_) => false,
            PipelineError::Store(e) => !matches!(e, BlobError::InvalidKey { .. }),
            PipelineError::Cancelled(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Transform(_) => "transform",
            PipelineError::Hash(_) => "hash",
            PipelineError::Store(_) => "store",
            PipelineError::Cancelled(_) => "cancelled",
        }
    }
}

impl From<TransformError> for PipelineError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Interrupted(reason) => PipelineError::Cancelled(reason),
            other => PipelineError::Transform(other),
        }
    }
}

/// Fetch → transform → digest → checksum → store
#[derive(Debug, Clone)]
pub struct Pipeline<S, T> {
    store: S,
    transformer: T,
    hasher: ContentHasher,
}

impl<S, T> Pipeline<S, T>
where
    S: BlobStore,
    T: Transformer,
{
    pub fn new(store: S, transformer: T, hasher: ContentHasher) -> Self {
        Self {
            store,
            transformer,
            hasher,
        }
    }

    #[instrument(skip(self, ctx, source), fields(source = %source))]
    pub async fn process(
        &self,
        ctx: &Context,
        source: &SourceRef,
    ) -> Result<ProcessedImage, PipelineError> {
        let reader = ctx
            .run(self.store.download(ctx, source.as_str()))
            .await?
            .map_err(PipelineError::Fetch)?;

        // The reader moves into the transformer and is dropped when it returns
        let (metadata, bytes) = ctx.run(self.transformer.process(ctx, reader)).await??;

        let sha256 = self.hasher.digest(&bytes)?;
        let record = ProcessedImage::new(metadata, sha256, source.clone());
        let checksum = self.hasher.checksum(&bytes);
        let key = record.storage_key();

        debug!(key = %key, checksum = %checksum, bytes = bytes.len(), "Transformed image");

        let upload = ctx
            .run(self.store.upload(ctx, key.as_str(), checksum))
            .await?
            .map_err(PipelineError::Store)?;

        match upload {
            Upload::AlreadyExists => {
                info!(key = %key, "Image already stored, skipping write");
            },
            Upload::Sink(mut sink) => {
                ctx.run(sink.write_all(&bytes)).await?.map_err(PipelineError::Store)?;
                ctx.run(sink.commit()).await?.map_err(PipelineError::Store)?;
                info!(key = %key, bytes = bytes.len(), "Stored image");
            },
        }

        Ok(record)
    }
}

#[async_trait]
impl<S, T> Handler for Pipeline<S, T>
where
    S: BlobStore,
    T: Transformer,
{
    async fn handle(&self, ctx: Context, source: SourceRef) -> Result<ProcessedImage, PipelineError> {
        self.process(&ctx, &source).await
    }
}
