//! The retry controller.
//!
//! [`Retry`] re-invokes an async operation until it succeeds, fails with a
//! terminal error, runs out of attempts, or its [`CancelSignal`] fires.
//! Between attempts it waits either a fixed base delay or whatever the
//! configured [`Backoff`] computes; the wait is raced against the signal.

use crate::backoff::Backoff;
use crate::error::{Attempt, RetryError};
use crate::signal::CancelSignal;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Fixed wait between attempts when no [`Backoff`] is configured.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Retry controller.
///
/// Configuration is fixed once built. Every `ensure*` call runs an
/// independent sequence: it gets its own copy of the configured backoff, so
/// one controller can serve concurrent calls.
///
/// # Examples
///
/// ```rust
/// use steadfast::{Attempt, Retry};
/// use std::time::Duration;
///
/// # async fn example() {
/// let retry = Retry::builder()
///     .base_delay(Duration::from_millis(10))
///     .build();
///
/// let mut calls = 0;
/// let value = retry
///     .ensure_times(5, || {
///         calls += 1;
///         let attempt = calls;
///         async move {
///             if attempt < 3 {
///                 Err(Attempt::retry_msg("not yet"))
///             } else {
///                 Ok(attempt)
///             }
///         }
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(value, 3);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Retry {
    base_delay: Duration,
    signal: Option<CancelSignal>,
    recover_panics: bool,
    backoff: Option<Backoff>,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            signal: None,
            recover_panics: false,
            backoff: None,
        }
    }
}

impl Retry {
    /// Controller with default settings: 100ms fixed delay, no signal, panics propagate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder.
    pub fn builder() -> RetryBuilder {
        RetryBuilder::default()
    }

    /// Fixed delay used when no backoff is configured.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// The attached cancellation signal, if any.
    pub fn signal(&self) -> Option<&CancelSignal> {
        self.signal.as_ref()
    }

    /// Whether panics inside the operation are recovered.
    pub fn recovers_panics(&self) -> bool {
        self.recover_panics
    }

    /// The backoff template copied into each sequence.
    pub fn backoff(&self) -> Option<&Backoff> {
        self.backoff.as_ref()
    }

    /// Retry `op` until it succeeds, fails terminally, or the signal fires.
    pub async fn ensure<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
    {
        self.ensure_times(0, op).await
    }

    /// Retry `op` at most `max_attempts` times; `0` means unlimited.
    ///
    /// When every permitted attempt fails with a retryable error, the last of
    /// those errors is returned as [`RetryError::Exhausted`].
    pub async fn ensure_times<F, Fut, T, E>(&self, max_attempts: u32, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
    {
        let signal = self.signal.clone().unwrap_or_default();
        let mut backoff = self.backoff.clone();

        Sequence {
            signal: &signal,
            base_delay: self.base_delay,
            backoff: backoff.as_mut(),
            recover_panics: self.recover_panics,
        }
        .run(max_attempts, op)
        .await
    }
}

/// Builder for [`Retry`].
///
/// Options are independent and can be set in any order. A backoff, when set,
/// takes precedence over the base delay.
#[derive(Debug, Default)]
pub struct RetryBuilder {
    base_delay: Option<Duration>,
    signal: Option<CancelSignal>,
    recover_panics: bool,
    backoff: Option<Backoff>,
}

impl RetryBuilder {
    /// Set the fixed delay between attempts.
    ///
    /// Default: 100ms
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Attach a cancellation signal.
    ///
    /// Without one, each sequence uses a private signal that never fires.
    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Convert panics inside the operation into [`RetryError::Panicked`].
    pub fn recover_panics(mut self) -> Self {
        self.recover_panics = true;
        self
    }

    /// Compute waits with an exponential backoff instead of the base delay.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Build the controller.
    pub fn build(self) -> Retry {
        Retry {
            base_delay: self.base_delay.unwrap_or(DEFAULT_BASE_DELAY),
            signal: self.signal,
            recover_panics: self.recover_panics,
            backoff: self.backoff,
        }
    }
}

/// Retry `op` without an attempt limit until it succeeds, fails terminally, or `signal` fires.
///
/// Waits [`DEFAULT_BASE_DELAY`] between attempts.
pub async fn ensure<F, Fut, T, E>(signal: &CancelSignal, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    Sequence {
        signal,
        base_delay: DEFAULT_BASE_DELAY,
        backoff: None,
        recover_panics: false,
    }
    .run(0, op)
    .await
}

/// Like [`ensure`], but waits according to `backoff`.
///
/// The caller keeps ownership of the backoff, so its attempt counter carries
/// over into later sequences unless it is [reset](Backoff::reset).
///
/// # Examples
///
/// ```rust
/// use steadfast::{ensure_with_backoff, Attempt, Backoff, CancelSignal};
/// use std::time::Duration;
///
/// # async fn example() {
/// let signal = CancelSignal::new();
/// let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(20), 2.0);
///
/// let mut failures = 2;
/// let result = ensure_with_backoff(&signal, &mut backoff, || {
///     let fail = failures > 0;
///     failures -= 1;
///     async move {
///         if fail {
///             Err(Attempt::retry_msg("flaky"))
///         } else {
///             Ok(())
///         }
///     }
/// })
/// .await;
///
/// assert!(result.is_ok());
/// assert_eq!(backoff.attempts(), 2);
/// # }
/// ```
pub async fn ensure_with_backoff<F, Fut, T, E>(
    signal: &CancelSignal,
    backoff: &mut Backoff,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    Sequence {
        signal,
        base_delay: DEFAULT_BASE_DELAY,
        backoff: Some(backoff),
        recover_panics: false,
    }
    .run(0, op)
    .await
}

/// State for one retry sequence.
struct Sequence<'a> {
    signal: &'a CancelSignal,
    base_delay: Duration,
    backoff: Option<&'a mut Backoff>,
    recover_panics: bool,
}

impl Sequence<'_> {
    async fn run<F, Fut, T, E>(mut self, max_attempts: u32, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
    {
        let limited = max_attempts > 0;
        let mut remaining = max_attempts;
        let mut attempts: u32 = 0;

        loop {
            if let Some(reason) = self.signal.reason() {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempts, %reason, "retry cancelled before attempt");
                return Err(RetryError::Cancelled(reason));
            }

            attempts = attempts.saturating_add(1);
            let outcome = self.invoke(&mut op).await?;
            match outcome {
                Ok(value) => return Ok(value),
                Err(Attempt::Terminal(e)) => return Err(RetryError::Terminal(e)),
                Err(Attempt::Retryable(e)) => {
                    if limited {
                        remaining -= 1;
                        if remaining == 0 {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(attempts, "retry budget exhausted");
                            return Err(RetryError::Exhausted { attempts, last: e });
                        }
                    }

                    let delay = self.next_delay();
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempts, ?delay, "retryable failure, waiting");

                    tokio::select! {
                        biased;
                        reason = self.signal.done() => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(attempts, %reason, "retry cancelled while waiting");
                            return Err(RetryError::Cancelled(reason));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Run one attempt. The outer error is a recovered panic.
    async fn invoke<F, Fut, T, E>(&self, op: &mut F) -> Result<Result<T, Attempt<E>>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
    {
        if !self.recover_panics {
            return Ok(op().await);
        }

        // Covers panics both in the call that builds the future and while polling it.
        match AssertUnwindSafe(async { op().await }).catch_unwind().await {
            Ok(result) => Ok(result),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                #[cfg(feature = "tracing")]
                tracing::warn!(panic = %message, "recovered panic in retried operation");
                Err(RetryError::Panicked(message))
            }
        }
    }

    fn next_delay(&mut self) -> Duration {
        match self.backoff.as_deref_mut() {
            Some(backoff) => backoff.next_delay(),
            None => self.base_delay,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_builder_defaults() {
        let retry = Retry::builder().build();

        assert_eq!(retry.base_delay(), DEFAULT_BASE_DELAY);
        assert!(retry.signal().is_none());
        assert!(!retry.recovers_panics());
        assert!(retry.backoff().is_none());
    }

    #[test]
    fn test_builder_custom_values() {
        let signal = CancelSignal::new();
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_secs(1), 2.0);
        let retry = Retry::builder()
            .backoff(backoff.clone())
            .recover_panics()
            .signal(signal.clone())
            .base_delay(Duration::from_secs(2))
            .build();

        assert_eq!(retry.base_delay(), Duration::from_secs(2));
        assert!(retry.signal().is_some());
        assert!(retry.recovers_panics());
        assert_eq!(retry.backoff(), Some(&backoff));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[tokio::test(start_paused = true)]
    async fn test_base_delay_used_without_backoff() {
        let retry = Retry::builder().base_delay(Duration::from_secs(1)).build();
        let start = tokio::time::Instant::now();

        let result = retry
            .ensure_times(4, || async { Err::<(), _>(Attempt::retry_msg("busy")) })
            .await;

        assert!(result.unwrap_err().is_exhausted());
        // three waits: none after the final attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_overrides_base_delay() {
        let retry = Retry::builder()
            .base_delay(Duration::from_secs(60))
            .backoff(Backoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0))
            .build();
        let start = tokio::time::Instant::now();

        let result = retry
            .ensure_times(4, || async { Err::<(), _>(Attempt::retry_msg("busy")) })
            .await;

        assert!(result.is_err());
        // 100ms + 200ms + 400ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700) && elapsed < Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_call_gets_fresh_backoff() {
        let retry = Retry::builder()
            .backoff(Backoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0))
            .build();

        for _ in 0..2 {
            let start = tokio::time::Instant::now();
            let _ = retry
                .ensure_times(3, || async { Err::<(), _>(Attempt::retry_msg("busy")) })
                .await;
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(350));
        }
        assert_eq!(retry.backoff().map(Backoff::attempts), Some(0));
    }

    #[tokio::test]
    async fn test_panic_in_future_constructor_is_recovered() {
        let retry = Retry::builder().recover_panics().build();
        let calls = Cell::new(0);

        let result: Result<(), RetryError<std::io::Error>> = retry
            .ensure(|| {
                calls.set(calls.get() + 1);
                if calls.get() > 0 {
                    panic!("failed before building the future");
                }
                async { Ok(()) }
            })
            .await;

        assert_eq!(calls.get(), 1);
        assert!(matches!(
            result,
            Err(RetryError::Panicked(ref message)) if message == "failed before building the future"
        ));
    }
}
