//! Generic retry/backoff engine for fallible async operations.
//!
//! [`with_retry`] re-invokes an operation on transient failures with
//! exponential backoff and optional jitter. Classification is message-based:
//! the default classifier recognizes the transient phrases providers actually
//! emit, and a [`LlmError::Timeout`] is always considered transient.
//!
//! Panics inside the operation are deliberately not caught: a programmer
//! error escapes unchanged instead of being recast as a domain failure.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;

/// Predicate deciding whether a failure is worth retrying.
pub type Classifier = fn(&LlmError) -> bool;

/// Observer invoked before each backoff sleep with `(attempt, error, delay_ms)`.
/// `attempt` counts from 1 for the first retry.
pub type RetryObserver = Arc<dyn Fn(u32, &LlmError, u64) + Send + Sync>;

/// Tunable knobs for [`with_retry`].
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts, not counting the initial invocation.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Ceiling applied to the exponential delay.
    pub max_delay_ms: u64,
    /// Base of the exponential growth, typically 2.
    pub backoff_multiplier: f64,
    /// Randomize each delay by ±25% to avoid thundering herds.
    pub add_jitter: bool,
    /// Predicate selecting retryable failures.
    pub retryable: Classifier,
    /// Optional hook observing each scheduled retry.
    pub on_retry: Option<RetryObserver>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            add_jitter: true,
            retryable: default_classifier,
            on_retry: None,
        }
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay_ms", &self.initial_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("add_jitter", &self.add_jitter)
            .finish_non_exhaustive()
    }
}

/// Message substrings that mark a failure as transient.
const TRANSIENT_HINTS: [&str; 14] = [
    "network",
    "connection reset",
    "connection refused",
    "timeout",
    "timed out",
    "rate limit",
    "429",
    "too many requests",
    "500",
    "502",
    "503",
    "504",
    "temporarily unavailable",
    "service unavailable",
];

/// Vendor-specific transient phrase emitted when the platform sheds load.
const VENDOR_TRANSIENT_HINT: &str = "overloaded";

/// Default transient-failure classifier.
///
/// A [`LlmError::Timeout`] is always retryable regardless of its message;
/// a [`LlmError::Validation`] never is. Everything else is matched
/// case-insensitively against the known transient phrases.
///
/// # Examples
///
/// ```
/// use valet_llm::error::LlmError;
/// use valet_llm::retry::default_classifier;
///
/// assert!(default_classifier(&LlmError::internal("status 503: overloaded")));
/// assert!(default_classifier(&LlmError::timeout("deadline exceeded")));
/// assert!(!default_classifier(&LlmError::validation("missing api key")));
/// ```
pub fn default_classifier(error: &LlmError) -> bool {
    match error {
        LlmError::Timeout { .. } => true,
        LlmError::Validation { .. } => false,
        LlmError::Internal { message } => {
            let lower = message.to_ascii_lowercase();
            TRANSIENT_HINTS.iter().any(|hint| lower.contains(hint))
                || lower.contains(VENDOR_TRANSIENT_HINT)
        }
    }
}

/// Computes the backoff delay for the given zero-based attempt, before jitter.
pub fn backoff_delay_ms(config: &RetryConfig, attempt: u32) -> u64 {
    let raw = config.initial_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    raw.min(config.max_delay_ms as f64).round() as u64
}

fn jittered_delay_ms(config: &RetryConfig, attempt: u32) -> u64 {
    let base = backoff_delay_ms(config, attempt) as f64;
    if !config.add_jitter {
        return base.round() as u64;
    }
    let factor = rand::thread_rng().gen_range(-0.25..=0.25);
    (base + base * factor).max(0.0).round() as u64
}

/// Runs `op` until it succeeds, fails non-transiently, or exhausts retries.
///
/// A failure that exhausts every retry is wrapped into a terminal
/// [`LlmError::Internal`] embedding the retry count and the last underlying
/// message. Non-retryable failures propagate unchanged so `Validation` and
/// `Timeout` stay typed at the public boundary.
pub async fn with_retry<T, F, Fut>(mut op: F, config: &RetryConfig) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !(config.retryable)(&error) {
                    return Err(error);
                }
                if attempt >= config.max_retries {
                    return Err(LlmError::internal(format!(
                        "operation failed after {} retries: {}",
                        config.max_retries,
                        error.message()
                    )));
                }
                let delay_ms = jittered_delay_ms(config, attempt);
                attempt += 1;
                tracing::warn!(attempt, delay_ms, error = %error, "retrying after transient failure");
                if let Some(hook) = &config.on_retry {
                    hook(attempt, &error, delay_ms);
                }
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transient(message: &str) -> LlmError {
        LlmError::internal(message.to_string())
    }

    fn no_jitter_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            add_jitter: false,
            ..RetryConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient("connection reset by peer"))
                    } else {
                        Ok("done")
                    }
                }
            },
            &no_jitter_config(3),
        )
        .await;

        assert_eq!(result.expect("should succeed"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error_with_retry_count() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient("status 503: service unavailable")) }
            },
            &no_jitter_config(3),
        )
        .await;

        let err = result.expect_err("should exhaust retries");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let message = err.message();
        assert!(message.contains("after 3 retries"), "message: {message}");
        assert!(
            message.contains("status 503: service unavailable"),
            "message: {message}"
        );
    }

    #[tokio::test]
    async fn non_retryable_halts_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::validation("model is required")) }
            },
            &no_jitter_config(5),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.expect_err("should fail"),
            LlmError::Validation { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_capped_exponential_delays() {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let seen = delays.clone();
        let config = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 600,
            backoff_multiplier: 2.0,
            add_jitter: false,
            retryable: default_classifier,
            on_retry: Some(Arc::new(move |_, _, delay_ms| {
                seen.lock().expect("lock").push(delay_ms);
            })),
        };

        let result: Result<(), _> =
            with_retry(|| async { Err(transient("network unreachable")) }, &config).await;

        assert!(result.is_err());
        assert_eq!(*delays.lock().expect("lock"), vec![500, 600, 600]);
    }

    #[test]
    fn backoff_delay_follows_formula() {
        let config = RetryConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            ..RetryConfig::default()
        };
        assert_eq!(backoff_delay_ms(&config, 0), 1_000);
        assert_eq!(backoff_delay_ms(&config, 1), 2_000);
        assert_eq!(backoff_delay_ms(&config, 2), 4_000);
        assert_eq!(backoff_delay_ms(&config, 3), 8_000);
        assert_eq!(backoff_delay_ms(&config, 4), 10_000);
    }

    #[test]
    fn classifier_matches_transient_phrases_case_insensitively() {
        for message in [
            "Connection Refused",
            "Rate Limit exceeded",
            "HTTP 429 Too Many Requests",
            "status 502: bad gateway",
            "upstream temporarily unavailable",
            "Overloaded",
        ] {
            assert!(default_classifier(&transient(message)), "{message}");
        }
        assert!(!default_classifier(&transient("invalid model name")));
    }
}
