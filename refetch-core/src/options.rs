//! Per-request fetch options.
//!
//! [`FetchOptions`] controls how one `fetch` call treats the cache and how the
//! producer is retried. Options deserialize from configuration files with
//! human-readable durations:
//!
//! ```
//! use refetch_core::FetchOptions;
//! use std::time::Duration;
//!
//! let options: FetchOptions = serde_json::from_str(
//!     r#"{ "ttl": "30s", "max_attempts": 5, "backoff_base": "250ms" }"#,
//! ).unwrap();
//!
//! assert_eq!(options.ttl, Duration::from_secs(30));
//! assert_eq!(options.max_attempts.get(), 5);
//! assert!(options.use_cache);
//! ```

use std::time::Duration;

use bounded_integer::bounded_integer;
use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Default time-to-live of a cached payload.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
/// Default base delay between producer attempts.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);
/// Default total number of producer attempts.
pub const DEFAULT_MAX_ATTEMPTS: u8 = 3;

bounded_integer! {
    /// Total number of producer attempts (1-255), first attempt included.
    #[repr(u8)]
    pub struct MaxAttempts { 1..=255 }
}

impl Default for MaxAttempts {
    fn default() -> Self {
        MaxAttempts::new(DEFAULT_MAX_ATTEMPTS).unwrap_or(MaxAttempts::MIN)
    }
}

/// Base delay of the linear backoff; always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HumanDuration", into = "HumanDuration")]
pub struct BackoffBase(Duration);

#[derive(Serialize, Deserialize)]
struct HumanDuration(#[serde(with = "humantime_serde")] Duration);

impl TryFrom<HumanDuration> for BackoffBase {
    type Error = OptionsError;

    fn try_from(value: HumanDuration) -> Result<Self, Self::Error> {
        BackoffBase::new(value.0)
    }
}

impl From<BackoffBase> for HumanDuration {
    fn from(value: BackoffBase) -> Self {
        HumanDuration(value.0)
    }
}

impl BackoffBase {
    /// Creates a backoff base, rejecting a zero duration.
    pub fn new(base: Duration) -> Result<Self, OptionsError> {
        if base.is_zero() {
            Err(OptionsError::ZeroBackoff)
        } else {
            Ok(BackoffBase(base))
        }
    }

    /// Returns the base delay.
    pub fn get(self) -> Duration {
        self.0
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// The delay grows linearly: `base * attempt`.
    pub fn delay_after(self, attempt: u32) -> Duration {
        self.0.saturating_mul(attempt)
    }
}

impl Default for BackoffBase {
    fn default() -> Self {
        BackoffBase(DEFAULT_BACKOFF_BASE)
    }
}

/// Options recognized by `fetch` and `refresh`.
///
/// When several callers join the same in-flight request, the options of the
/// caller that started it govern retries and the TTL stored with the result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchOptions {
    /// How long a stored payload stays fresh (e.g. "5m", "500ms").
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Total number of producer attempts.
    pub max_attempts: MaxAttempts,
    /// Base delay of the linear backoff between attempts.
    pub backoff_base: BackoffBase,
    /// Serve fresh (and stale) payloads from the cache.
    pub use_cache: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_attempts: MaxAttempts::default(),
            backoff_base: BackoffBase::default(),
            use_cache: true,
        }
    }
}

impl FetchOptions {
    /// Create a new builder for FetchOptions.
    pub fn builder() -> FetchOptionsBuilder {
        FetchOptionsBuilder::default()
    }

    /// Returns a copy of these options that bypasses the cache.
    pub fn bypass_cache(self) -> Self {
        Self {
            use_cache: false,
            ..self
        }
    }

    /// Total attempts as a plain number.
    pub fn attempts(&self) -> u32 {
        u32::from(self.max_attempts.get())
    }
}

/// Builder for FetchOptions.
#[derive(Debug, Clone, Default)]
pub struct FetchOptionsBuilder {
    options: FetchOptions,
}

impl FetchOptionsBuilder {
    /// Set the time-to-live. Zero makes every stored payload stale at once.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = ttl;
        self
    }

    /// Set the total number of attempts.
    pub fn max_attempts(mut self, attempts: MaxAttempts) -> Self {
        self.options.max_attempts = attempts;
        self
    }

    /// Set the backoff base.
    pub fn backoff_base(mut self, base: BackoffBase) -> Self {
        self.options.backoff_base = base;
        self
    }

    /// Enable or disable reading from the cache.
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.options.use_cache = enabled;
        self
    }

    /// Build the FetchOptions.
    pub fn build(self) -> FetchOptions {
        self.options
    }
}
