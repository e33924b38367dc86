//! Per-request execution context: request id, deadline, and cancellation.
//!
//! Every enveloped request gets its own [`RequestContext`] whose token is a
//! child of the server-wide root token. Expiry or cancellation of one
//! context never affects another; cancelling the root cancels them all.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a bounded call was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("context cancelled")]
    Cancelled,
}

/// Deadline-bound context threaded through domain handlers into every
/// downstream capability call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    deadline: Instant,
    token: CancellationToken,
}

impl RequestContext {
    /// Derives a context from `parent` that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(
        parent: &CancellationToken,
        request_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: Instant::now() + timeout,
            token: parent.child_token(),
        }
    }

    /// A context with no parent, for startup work and tests.
    #[must_use]
    pub fn detached(request_id: impl Into<String>, timeout: Duration) -> Self {
        Self::with_timeout(&CancellationToken::new(), request_id, timeout)
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cancels this context and any context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the reason this context is finished, if it is.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] once the context is cancelled or expired.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            Err(ContextError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(ContextError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Runs `fut` until it completes, the deadline passes, or the context is
    /// cancelled. The future is dropped on expiry, aborting any I/O it owns.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the future did not finish in time.
    pub async fn bound<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        self.check()?;
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(ContextError::Cancelled),
            output = fut => Ok(output),
            () = tokio::time::sleep_until(self.deadline) => Err(ContextError::DeadlineExceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bound_returns_output_when_fast() {
        let ctx = RequestContext::detached("req-1", Duration::from_secs(1));
        let value = ctx.bound(async { 42 }).await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn bound_expires_at_deadline() {
        let ctx = RequestContext::detached("req-2", Duration::from_millis(100));
        let result = ctx.bound(std::future::pending::<()>()).await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn cancelled_context_aborts_promptly() {
        let ctx = RequestContext::detached("req-3", Duration::from_secs(10));
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = ctx.bound(std::future::pending::<()>()).await;
        assert_eq!(result, Err(ContextError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn already_cancelled_context_skips_ready_future() {
        let ctx = RequestContext::detached("req-4", Duration::from_secs(10));
        ctx.cancel();
        let result = ctx.bound(async { 1 }).await;
        assert_eq!(result, Err(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn root_cancellation_reaches_children_only_downward() {
        let root = CancellationToken::new();
        let a = RequestContext::with_timeout(&root, "a", Duration::from_secs(10));
        let b = RequestContext::with_timeout(&root, "b", Duration::from_secs(10));

        a.cancel();
        assert_eq!(a.check(), Err(ContextError::Cancelled));
        assert_eq!(b.check(), Ok(()));
        assert!(!root.is_cancelled());

        root.cancel();
        assert_eq!(b.check(), Err(ContextError::Cancelled));
    }
}
