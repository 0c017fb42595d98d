#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Retry a fallible async operation until it succeeds, fails for good, runs
//! out of attempts, or is cancelled.
//!
//! - **Explicit classification** via [`Attempt`]: only
//!   [`Attempt::Retryable`] failures are retried, anything converted with `?`
//!   is terminal
//! - **Fixed or exponential waits** via [`Retry::builder`] and [`Backoff`],
//!   with optional jitter anchored at the minimum delay
//! - **Cooperative cancellation** via [`CancelSignal`], checked before every
//!   attempt and raced against every wait
//! - **Panic isolation**: with [`RetryBuilder::recover_panics`], a panic in the
//!   operation becomes [`RetryError::Panicked`] instead of unwinding through
//!   the caller
//! - **File-based settings** via [`RetryConfig`] (TOML or JSON)
//!
//! Every call resolves to exactly one of: the operation's value, its terminal
//! error, the last retryable error once the budget is spent, the cancellation
//! reason, or a recovered panic.
//!
//! # Examples
//!
//! ```rust
//! use steadfast::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signal = CancelSignal::with_timeout(Duration::from_secs(30));
//! let retry = Retry::builder()
//!     .signal(signal.clone())
//!     .backoff(Backoff::new(Duration::from_millis(50), Duration::from_secs(5), 2.0).with_jitter(true))
//!     .recover_panics()
//!     .build();
//!
//! let body = retry
//!     .ensure_times(5, || async {
//!         std::fs::read_to_string("/etc/hostname").retryable()
//!     })
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! - `tracing`: emit `tracing` events for waits, cancellation and recovered panics.

pub mod backoff;
pub mod config;
pub mod error;
pub mod retry;
pub mod signal;

pub use backoff::Backoff;
pub use config::{BackoffConfig, ConfigError, RetryConfig};
pub use error::{Attempt, BoxError, ResultExt, RetryError};
pub use retry::{DEFAULT_BASE_DELAY, Retry, RetryBuilder, ensure, ensure_with_backoff};
pub use signal::{CancelReason, CancelSignal};

/// Convenient re-exports of commonly used items.
///
/// Import all core abstractions with:
///
/// ```rust
/// use steadfast::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::Backoff;
    pub use crate::error::{Attempt, ResultExt, RetryError};
    pub use crate::retry::{Retry, ensure, ensure_with_backoff};
    pub use crate::signal::{CancelReason, CancelSignal};
}
