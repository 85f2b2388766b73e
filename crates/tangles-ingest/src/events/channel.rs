//! In-process event source backed by a bounded tokio channel

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tangles_common::SourceRef;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{Handler, ListenError, ListenStats, Listener};
use crate::context::Context;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Invocations allowed to run at once
    pub max_in_flight: usize,

    /// Per-attempt deadline; `None` leaves attempts unbounded
    pub timeout: Option<Duration>,

    /// Total attempts per notification, including the first
    pub max_attempts: u32,

    /// Base backoff; attempt `n` waits `retry_delay * n`
    pub retry_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            timeout: Some(DEFAULT_TIMEOUT),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Create a connected publisher/listener pair with room for `capacity`
/// queued notifications.
pub fn channel(config: ListenerConfig, capacity: usize) -> (Publisher, ChannelListener) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        Publisher { sender },
        ChannelListener {
            config,
            receiver: Mutex::new(Some(receiver)),
        },
    )
}

/// Sending half. The listener stops once every publisher is dropped and the
/// queue is empty.
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: mpsc::Sender<SourceRef>,
}

impl Publisher {
    /// Queue a notification, waiting for room if the channel is full
    pub async fn publish(&self, source: SourceRef) -> Result<(), ListenError> {
        self.sender.send(source).await.map_err(|_| ListenError::Closed)
    }
}

#[derive(Debug)]
pub struct ChannelListener {
    config: ListenerConfig,
    receiver: Mutex<Option<mpsc::Receiver<SourceRef>>>,
}

impl ChannelListener {
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ListenStats {
        ListenStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Listener for ChannelListener {
    async fn listen(&self, ctx: &Context, handler: Arc<dyn Handler>) -> Result<ListenStats, ListenError> {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ListenError::AlreadyListening)?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let counters = Arc::new(Counters::default());
        let mut tasks = JoinSet::new();

        info!(
            max_in_flight = self.config.max_in_flight,
            max_attempts = self.config.max_attempts,
            "Listening for source notifications"
        );

        loop {
            let source = tokio::select! {
                biased;
                reason = ctx.done() => {
                    info!(%reason, "Listener stopping");
                    break;
                },
                next = receiver.recv() => match next {
                    Some(source) => source,
                    None => {
                        debug!("All publishers dropped");
                        break;
                    },
                },
            };

            let permit = tokio::select! {
                biased;
                reason = ctx.done() => {
                    warn!(%reason, source = %source, "Listener stopping, notification not started");
                    break;
                },
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            Counters::bump(&counters.delivered);
            let attempt = Delivery {
                handler: Arc::clone(&handler),
                root: ctx.clone(),
                config: self.config.clone(),
                counters: Arc::clone(&counters),
            };
            tasks.spawn(async move {
                attempt.run(source).await;
                drop(permit);
            });

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Delivery task failed");
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Draining in-flight deliveries");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Delivery task failed");
            }
        }

        let stats = counters.snapshot();
        info!(
            delivered = stats.delivered,
            completed = stats.completed,
            failed = stats.failed,
            retried = stats.retried,
            "Listener stopped"
        );
        Ok(stats)
    }
}

struct Delivery {
    handler: Arc<dyn Handler>,
    root: Context,
    config: ListenerConfig,
    counters: Arc<Counters>,
}

impl Delivery {
    async fn run(self, source: SourceRef) {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            let mut ctx = self.root.child();
            if let Some(timeout) = self.config.timeout {
                ctx = ctx.with_timeout(timeout);
            }

            match self.handler.handle(ctx, source.clone()).await {
                Ok(image) => {
                    Counters::bump(&self.counters.completed);
                    info!(
                        source = %source,
                        key = %image.storage_key(),
                        attempt,
                        "Processed image"
                    );
                    return;
                },
                Err(e) if e.is_retryable() && attempt < max_attempts && !self.root.is_cancelled() => {
                    Counters::bump(&self.counters.retried);
                    let delay = self.config.retry_delay * attempt;
                    warn!(
                        source = %source,
                        kind = e.kind(),
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, redelivering"
                    );
                    if self.root.run(tokio::time::sleep(delay)).await.is_err() {
                        Counters::bump(&self.counters.failed);
                        warn!(source = %source, "Listener stopped before redelivery");
                        return;
                    }
                    attempt += 1;
                },
                Err(e) => {
                    Counters::bump(&self.counters.failed);
                    error!(
                        source = %source,
                        kind = e.kind(),
                        error = %e,
                        attempt,
                        retryable = e.is_retryable(),
                        "Dropping notification"
                    );
                    return;
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use tangles_common::ProcessedImage;

    struct Never;

    #[async_trait]
    impl Handler for Never {
        async fn handle(&self, _ctx: Context, _source: SourceRef) -> Result<ProcessedImage, PipelineError> {
            Err(PipelineError::Cancelled(crate::context::Cancelled::Cancelled))
        }
    }

    #[tokio::test]
    async fn test_listen_twice_is_rejected() {
        let (publisher, listener) = channel(ListenerConfig::default(), 4);
        drop(publisher);

        let handler: Arc<dyn Handler> = Arc::new(Never);
        let ctx = Context::background();
        assert_eq!(listener.listen(&ctx, Arc::clone(&handler)).await, Ok(ListenStats::default()));
        assert_eq!(listener.listen(&ctx, handler).await, Err(ListenError::AlreadyListening));
    }

    #[tokio::test]
    async fn test_publish_after_listener_dropped_fails() {
        let (publisher, listener) = channel(ListenerConfig::default(), 1);
        drop(listener);
        let source = SourceRef::new("uploads/abc").unwrap();
        assert_eq!(publisher.publish(source).await, Err(ListenError::Closed));
    }
}
