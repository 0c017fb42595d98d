//! Cooperative cancellation for retry sequences.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`CancelSignal`] fired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelReason {
    /// [`CancelSignal::cancel`] was called.
    #[error("operation cancelled")]
    Cancelled,
    /// The signal's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Cancelled with a caller-supplied reason.
    #[error("cancelled: {0}")]
    Custom(String),
}

/// A one-way stop token observed by the retry controller.
///
/// A signal starts active and becomes done exactly once, either through
/// [`cancel`](Self::cancel) / [`cancel_with`](Self::cancel_with) or when its
/// deadline passes. Done is permanent. Clones share state, so the caller keeps
/// one clone to fire and hands another to the controller.
///
/// The first recorded reason wins; later calls to `cancel_with` are no-ops.
///
/// # Examples
///
/// ```rust
/// use steadfast::{CancelReason, CancelSignal};
///
/// let signal = CancelSignal::new();
/// let observer = signal.clone();
///
/// assert!(!observer.is_cancelled());
/// signal.cancel_with("shutting down");
/// signal.cancel();
///
/// assert!(observer.is_cancelled());
/// assert_eq!(observer.reason(), Some(CancelReason::Custom("shutting down".into())));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
    deadline: Option<Instant>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn recorded_reason(&self) -> CancelReason {
        if let Some(reason) = self.reason.get() {
            return reason.clone();
        }
        match &self.parent {
            Some(parent) => parent.recorded_reason(),
            None => CancelReason::Cancelled,
        }
    }

    fn fire(&self, reason: CancelReason) {
        // A signal already done through its parent or an expired deadline
        // keeps that reason.
        let reason = if self.token.is_cancelled() {
            self.recorded_reason()
        } else if self.deadline_passed() {
            CancelReason::DeadlineExceeded
        } else {
            reason
        };
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl CancelSignal {
    /// Create an active signal with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal that fires with [`CancelReason::DeadlineExceeded`] at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline: Some(deadline),
                ..Inner::default()
            }),
        }
    }

    /// Create a signal that fires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Derive a signal that fires when this one does, and can also be cancelled on its own.
    ///
    /// Cancelling the child leaves the parent active. The child inherits the
    /// parent's deadline.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                reason: OnceLock::new(),
                deadline: self.inner.deadline,
                parent: Some(Arc::clone(&self.inner)),
            }),
        }
    }

    /// Fire the signal with [`CancelReason::Cancelled`].
    pub fn cancel(&self) {
        self.inner.fire(CancelReason::Cancelled);
    }

    /// Fire the signal with a custom reason.
    pub fn cancel_with(&self, reason: impl Into<String>) {
        self.inner.fire(CancelReason::Custom(reason.into()));
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Whether the signal is done.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// The reason the signal fired, or `None` while it is still active.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.inner.token.is_cancelled() {
            return Some(self.inner.recorded_reason());
        }
        if self.inner.deadline_passed() {
            self.inner.fire(CancelReason::DeadlineExceeded);
            return Some(self.inner.recorded_reason());
        }
        None
    }

    /// Wait until the signal is done and return the reason.
    pub async fn done(&self) -> CancelReason {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.inner.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {
                        self.inner.fire(CancelReason::DeadlineExceeded);
                    }
                }
            }
            None => self.inner.token.cancelled().await,
        }
        self.inner.recorded_reason()
    }
}
