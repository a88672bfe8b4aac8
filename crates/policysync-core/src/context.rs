//! Per-request cancellation and deadline handling.
//!
//! Every call the engine makes to an external collaborator goes through
//! [`RequestContext::run`], which races the call against the caller's
//! cancellation signal and the optional deadline. When either fires, the
//! in-flight future is dropped and [`Cancelled`] is returned; nothing is
//! retried.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a request context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Cancelled {
    /// The caller cancelled the request.
    #[error("request cancelled by caller")]
    Signalled,
    /// The request deadline passed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline state inherited by every external call of a
/// single request.
///
/// Cloning is cheap; clones observe the same cancellation signal.
///
/// # Examples
///
/// ```
/// use policysync_core::RequestContext;
///
/// let (ctx, handle) = RequestContext::cancellable();
/// assert!(!ctx.is_cancelled());
/// handle.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Caller-side handle used to cancel a [`RequestContext`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every clone of the paired context.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            cancel: None,
            deadline: None,
        }
    }

    /// A context paired with a [`CancelHandle`].
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Attach a deadline `timeout` from now. An earlier existing deadline wins.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// Whether the context has been cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Return the cancellation reason, if any, without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the caller cancelled or the deadline passed.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(Cancelled::Signalled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Cancelled::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `fut` under this context.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the context is already cancelled, or becomes
    /// cancelled (or expires) before `fut` completes. In the latter case `fut`
    /// is dropped mid-flight.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        self.check()?;

        tokio::select! {
            biased;
            () = self.signalled() => Err(Cancelled::Signalled),
            () = self.expired() => Err(Cancelled::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }

    async fn signalled(&self) {
        let Some(rx) = &self.cancel else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        // A dropped handle can never cancel.
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
