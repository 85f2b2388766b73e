//! Event source contract
//!
//! An event source delivers source references to a [`Handler`] and decides,
//! from the handler's result, whether a delivery is acknowledged or retried.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tangles_common::{ProcessedImage, SourceRef};
use thiserror::Error;

use crate::context::Context;
use crate::pipeline::PipelineError;

pub mod channel;

pub use channel::{channel, ChannelListener, ListenerConfig, Publisher};

/// Processes one notification
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context, source: SourceRef) -> Result<ProcessedImage, PipelineError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, ctx: Context, source: SourceRef) -> Result<ProcessedImage, PipelineError> {
        (**self).handle(ctx, source).await
    }
}

/// Drives a handler until the event source is exhausted or `ctx` ends
#[async_trait]
pub trait Listener: Send + Sync {
    async fn listen(&self, ctx: &Context, handler: Arc<dyn Handler>) -> Result<ListenStats, ListenError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    #[error("Listener is already running")]
    AlreadyListening,

    #[error("Event channel is closed")]
    Closed,
}

/// Totals for one `listen` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenStats {
    /// Notifications taken from the source
    pub delivered: u64,
    /// Notifications that produced a stored (or already stored) image
    pub completed: u64,
    /// Notifications dropped after a permanent error or exhausted retries
    pub failed: u64,
    /// Redeliveries after a transient error
    pub retried: u64,
}
