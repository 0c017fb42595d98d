//! Attempt classification and retry outcomes.
//!
//! An operation reports each failure as an [`Attempt`]: either
//! [`Attempt::Retryable`], which asks the controller for another try, or
//! [`Attempt::Terminal`], which ends the sequence. A whole `ensure` call
//! resolves to a single [`RetryError`] when it does not succeed.

use crate::signal::CancelReason;
use std::error::Error;
use std::fmt;

/// Boxed error used when an operation does not have its own error type.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Classification of a single failed attempt.
///
/// Only `Retryable` failures are retried. Any plain error converted with `?`
/// becomes `Terminal`, so an operation has to opt in to retries explicitly.
///
/// # Examples
///
/// ```rust
/// use steadfast::Attempt;
///
/// fn parse(input: &str) -> Result<u32, Attempt<std::num::ParseIntError>> {
///     // A parse error is not going to fix itself: `?` makes it terminal.
///     let value = input.parse::<u32>()?;
///     Ok(value)
/// }
///
/// assert!(!parse("nope").unwrap_err().is_retryable());
/// assert!(Attempt::retry_msg("try again").is_retryable());
/// ```
#[derive(Debug)]
pub enum Attempt<E = BoxError> {
    /// Eligible for another attempt.
    Retryable(E),
    /// Stops the retry sequence immediately.
    Terminal(E),
}

impl<E> Attempt<E> {
    /// Mark an error as retryable.
    pub fn retryable(error: E) -> Self {
        Self::Retryable(error)
    }

    /// Mark an error as terminal.
    pub fn terminal(error: E) -> Self {
        Self::Terminal(error)
    }

    /// Whether this failure should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Borrow the underlying cause.
    pub fn cause(&self) -> &E {
        match self {
            Self::Retryable(e) | Self::Terminal(e) => e,
        }
    }

    /// Unwrap the underlying cause, dropping the classification.
    pub fn into_cause(self) -> E {
        match self {
            Self::Retryable(e) | Self::Terminal(e) => e,
        }
    }

    /// Map the cause while keeping the classification.
    pub fn map<F, U>(self, f: F) -> Attempt<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Retryable(e) => Attempt::Retryable(f(e)),
            Self::Terminal(e) => Attempt::Terminal(f(e)),
        }
    }
}

impl Attempt<BoxError> {
    /// Build a retryable failure from a plain message.
    pub fn retry_msg(message: impl Into<String>) -> Self {
        Self::Retryable(message.into().into())
    }

    /// Build a terminal failure from a plain message.
    pub fn terminal_msg(message: impl Into<String>) -> Self {
        Self::Terminal(message.into().into())
    }
}

impl<E> From<E> for Attempt<E> {
    fn from(error: E) -> Self {
        Self::Terminal(error)
    }
}

impl<E: fmt::Display> fmt::Display for Attempt<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cause().fmt(f)
    }
}

impl<E: Error + 'static> Error for Attempt<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause())
    }
}

/// Classify the error side of a `Result` for the retry controller.
///
/// # Examples
///
/// ```rust
/// use steadfast::{Attempt, ResultExt};
/// use std::io;
///
/// fn connect(up: bool) -> Result<(), Attempt<io::Error>> {
///     if up {
///         Ok(())
///     } else {
///         Err(io::Error::from(io::ErrorKind::ConnectionRefused)).retryable()
///     }
/// }
///
/// assert!(connect(false).unwrap_err().is_retryable());
/// ```
pub trait ResultExt<T, E> {
    /// Tag the error, if any, as retryable.
    fn retryable(self) -> Result<T, Attempt<E>>;

    /// Tag the error, if any, as terminal.
    fn terminal(self) -> Result<T, Attempt<E>>;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn retryable(self) -> Result<T, Attempt<E>> {
        self.map_err(Attempt::Retryable)
    }

    fn terminal(self) -> Result<T, Attempt<E>> {
        self.map_err(Attempt::Terminal)
    }
}

/// Why a retry sequence ended without a value.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation returned a terminal failure.
    #[error("{0}")]
    Terminal(E),

    /// Every permitted attempt failed with a retryable error; `last` is the final one, verbatim.
    #[error("{last}")]
    Exhausted {
        /// Number of invocations made.
        attempts: u32,
        /// The last retryable cause.
        last: E,
    },

    /// The cancellation signal fired before or between attempts.
    #[error(transparent)]
    Cancelled(#[from] CancelReason),

    /// The operation panicked and panic recovery was enabled.
    #[error("panic recovered: {0}")]
    Panicked(String),
}

impl<E> RetryError<E> {
    /// The operation's own error, for terminal and exhausted outcomes.
    pub fn cause(&self) -> Option<&E> {
        match self {
            Self::Terminal(e) | Self::Exhausted { last: e, .. } => Some(e),
            Self::Cancelled(_) | Self::Panicked(_) => None,
        }
    }

    /// Consume the outcome, returning the operation's own error if there is one.
    pub fn into_cause(self) -> Option<E> {
        match self {
            Self::Terminal(e) | Self::Exhausted { last: e, .. } => Some(e),
            Self::Cancelled(_) | Self::Panicked(_) => None,
        }
    }

    /// The cancellation reason, if the sequence was cancelled.
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether the sequence was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Whether the attempt budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Whether a panic was recovered.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}
