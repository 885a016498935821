//! Cancellation and deadline context threaded through every fetch.
//!
//! A [`FetchContext`] pairs a [`CancellationToken`] with an optional deadline.
//! Contexts form a tree: cancelling a parent cancels every descendant, and a
//! child created with [`FetchContext::with_timeout`] never outlives its parent's
//! deadline.
//!
//! ```text
//! request ctx ──child()──> batch ctx ──with_timeout(D)──> item ctx (one per URL)
//! ```
//!
//! Cancellation is cooperative. Work only stops at points where it checks the
//! context, which in practice means [`FetchContext::run`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::ContextError;

#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl FetchContext {
    /// A fresh, live context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token (e.g. a child of the server's shutdown token).
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set an absolute deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(earliest(self.deadline, deadline));
        self
    }

    /// Derive a child sharing this context's deadline.
    ///
    /// Cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child whose deadline is the earlier of the parent's and `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let local = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(earliest(self.deadline, local)),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once this context or any ancestor was cancelled. Ignores the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Report whether the context is still live.
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(ContextError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Drive `future` to completion unless the context dies first.
    ///
    /// A context that is already dead never polls the future. When the context
    /// wins the race the future is dropped, which aborts any I/O it owns.
    pub async fn run<F, T>(&self, future: F) -> Result<T, ContextError>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            cause = self.done() => Err(cause),
            output = future => Ok(output),
        }
    }

    /// Cancel this context when the returned guard is dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

fn earliest(current: Option<Instant>, candidate: Instant) -> Instant {
    match current {
        Some(current) => current.min(candidate),
        None => candidate,
    }
}
