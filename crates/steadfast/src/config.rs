//! Loading retry settings from TOML or JSON.
//!
//! Delays are plain milliseconds so settings read naturally in config files:
//!
//! ```toml
//! base_delay_ms = 250
//! recover_panics = true
//!
//! [backoff]
//! min_delay_ms = 100
//! max_delay_ms = 30000
//! factor = 2.0
//! jitter = true
//! ```
//!
//! A cancellation signal cannot come from a file; attach one to the builder
//! returned by [`RetryConfig::to_builder`].

use crate::backoff::Backoff;
use crate::retry::{DEFAULT_BASE_DELAY, Retry, RetryBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors produced while loading or validating a [`RetryConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML document did not parse.
    #[error("invalid TOML retry config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The JSON document did not parse.
    #[error("invalid JSON retry config: {0}")]
    Json(#[from] serde_json::Error),

    /// The values parsed but cannot drive a retry sequence.
    #[error("invalid retry config: {0}")]
    Invalid(String),
}

/// Serializable settings for a [`Retry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Fixed delay between attempts when no backoff is configured.
    pub base_delay_ms: u64,
    /// Convert panics in the operation into errors.
    pub recover_panics: bool,
    /// Optional exponential backoff, taking precedence over `base_delay_ms`.
    pub backoff: Option<BackoffConfig>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            recover_panics: false,
            backoff: None,
        }
    }
}

/// Serializable settings for a [`Backoff`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// First and smallest delay.
    pub min_delay_ms: u64,
    /// Ceiling for every delay.
    pub max_delay_ms: u64,
    /// Growth factor per attempt.
    pub factor: f64,
    /// Randomize each delay within `[min, computed)`.
    #[serde(default)]
    pub jitter: bool,
}

impl BackoffConfig {
    /// Check the values and build a fresh [`Backoff`].
    pub fn to_backoff(&self) -> Result<Backoff, ConfigError> {
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff factor must be a positive number, got {}",
                self.factor
            )));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }

        Ok(Backoff::new(
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.factor,
        )
        .with_jitter(self.jitter))
    }
}

impl RetryConfig {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Parse settings from a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Validate and convert into a builder, ready for a signal to be attached.
    pub fn to_builder(&self) -> Result<RetryBuilder, ConfigError> {
        let mut builder = Retry::builder().base_delay(Duration::from_millis(self.base_delay_ms));
        if self.recover_panics {
            builder = builder.recover_panics();
        }
        if let Some(backoff) = &self.backoff {
            builder = builder.backoff(backoff.to_backoff()?);
        }
        Ok(builder)
    }

    /// Validate and build a controller without a cancellation signal.
    pub fn build(&self) -> Result<Retry, ConfigError> {
        Ok(self.to_builder()?.build())
    }
}
