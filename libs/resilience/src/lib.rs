//! Retry primitives shared by the connectivity probe and the config deployer.
//!
//! A [`RetryExecutor`] runs an async operation and, on failure, retries it with
//! capped exponential backoff:
//!
//! - delay for attempt `n` (0-based) is `min(initial_delay * 2^n, max_delay)`
//! - with jitter enabled the actual sleep is uniform in `[0, delay)` ("full jitter")
//! - every call has its own budget of `max_retries + 1` attempts
//!
//! # Invariants
//!
//! - Without jitter, delays are non-decreasing and never exceed `max_delay`
//! - `max_retries == 0` runs the operation exactly once and never sleeps
//! - Sleeping is a tokio suspension point; no lock is held by the executor

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

/// Terminal failure of a retried operation.
///
/// Carries the last error observed, tagged with the operation name and the
/// number of attempts made.
#[derive(Debug)]
pub struct RetryError<E> {
    operation: String,
    attempts: u32,
    last_error: E,
}

impl<E> RetryError<E> {
    /// Name of the operation that was retried.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The last error observed.
    pub fn last_error(&self) -> &E {
        &self.last_error
    }

    /// Unwrap into the last error observed.
    pub fn into_inner(self) -> E {
        self.last_error
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.operation, self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Retry policy.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Draw each sleep uniformly from `[0, delay)`.
    pub use_jitter: bool,

    /// Operation name used in logs and errors.
    pub name: String,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            use_jitter: true,
            name: "operation".to_string(),
        }
    }
}

impl RetryOptions {
    /// Default policy with the given operation name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Capped exponential delay for the given 0-based retry attempt.
    ///
    /// Saturates at `max_delay` instead of overflowing.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let scaled = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        scaled.min(self.max_delay)
    }

    /// The sleep actually taken before the given retry attempt.
    fn sleep_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if self.use_jitter {
            full_jitter(delay)
        } else {
            delay
        }
    }
}

/// Uniform random duration in `[0, delay)`.
pub fn full_jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis().min(u64::MAX as u128) as u64;
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..millis))
}

/// Runs operations under a [`RetryOptions`] policy.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    options: RetryOptions,
}

impl RetryExecutor {
    /// Create an executor for the given policy.
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    /// The policy in use.
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Run `op` until it succeeds or the retry budget is exhausted.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let name = self.options.name.as_str();
        let max_attempts = self.options.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(operation = name, attempt, max_attempts, "Attempting operation");

            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = name, attempt, "Operation succeeded after retry");
                    } else {
                        debug!(operation = name, "Operation succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        operation = name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed; retries exhausted"
                    );
                    return Err(RetryError {
                        operation: name.to_string(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.options.sleep_for(attempt - 1);
                    warn!(
                        operation = name,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Run `op` once under `options`; shorthand for a throwaway [`RetryExecutor`].
pub async fn execute<T, E, F, Fut>(options: &RetryOptions, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    RetryExecutor::new(options.clone()).execute(op).await
}

/// Default retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default cap on a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
