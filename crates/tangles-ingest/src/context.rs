//! Execution context for a pipeline invocation
//!
//! A [`Context`] carries a cancellation token and an optional deadline. Every
//! blocking step of an invocation is raced against it through
//! [`Context::run`], so a cancelled or expired invocation returns promptly
//! instead of hanging on a slow store or transformer.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation was abandoned
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellable, deadline-bearing execution context
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline unless one is added
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Tighten the deadline to `timeout` from now. An earlier existing
    /// deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A context cancelled whenever `self` is, but which can also be cancelled
    /// on its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails if the context is already cancelled or past its deadline
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            return Err(Cancelled::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancelled::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> Cancelled {
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Cancelled::Cancelled,
            _ = expiry => Cancelled::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless the context ends first.
    ///
    /// When the context wins, `fut` is dropped, which releases whatever
    /// resources it owned.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        self.check()?;

        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = fut => Ok(output),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
