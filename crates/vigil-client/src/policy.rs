//! Retry policy for outbound calls.
//!
//! A [`RetryPolicy`] is built once (usually from configuration) and shared
//! read-only by every call made through a
//! [`RetryingHttpClient`](crate::RetryingHttpClient).
//!
//! Backoff doubles with each attempt and adds a random jitter. The jitter is
//! clamped below the base backoff, which keeps consecutive delays strictly
//! increasing:
//!
//! ```text
//! delay(n) = base * 2^(n-1) + rand[0, min(jitter, base))
//! ```

use http::Method;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use vigil_core::NetworkErrorCode;

/// Statuses retried by default, in addition to every 5xx.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 2] = [408, 429];

/// Retry eligibility and backoff for outbound calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    jitter: Duration,
    attempt_timeout: Option<Duration>,
    retryable_codes: HashSet<NetworkErrorCode>,
    retryable_statuses: HashSet<u16>,
    retry_server_errors: bool,
    idempotent_methods: HashSet<Method>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            jitter: Duration::from_millis(100),
            attempt_timeout: Some(Duration::from_secs(10)),
            retryable_codes: NetworkErrorCode::ALL.into_iter().collect(),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            retry_server_errors: true,
            idempotent_methods: [
                Method::GET,
                Method::HEAD,
                Method::OPTIONS,
                Method::PUT,
                Method::DELETE,
                Method::TRACE,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy: 3 attempts, 100ms base backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum number of attempts. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base backoff.
    #[must_use]
    pub const fn with_base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    /// Sets the jitter range.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the per-attempt timeout. `None` lets an attempt run until the
    /// request deadline.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Replaces the set of retryable network codes.
    #[must_use]
    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = NetworkErrorCode>) -> Self {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    /// Replaces the set of individually retryable statuses.
    #[must_use]
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Sets whether every 5xx status is retryable.
    #[must_use]
    pub const fn with_server_errors(mut self, retry: bool) -> Self {
        self.retry_server_errors = retry;
        self
    }

    /// Replaces the set of methods retried without an explicit override.
    #[must_use]
    pub fn with_idempotent_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.idempotent_methods = methods.into_iter().collect();
        self
    }

    /// Maximum number of attempts (always at least 1).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base backoff.
    #[must_use]
    pub const fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    /// Effective jitter range, clamped to the base backoff.
    #[must_use]
    pub fn jitter(&self) -> Duration {
        self.jitter.min(self.base_backoff)
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Returns true if a response with this status may be retried.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
            || (self.retry_server_errors && (500..=599).contains(&status))
    }

    /// Returns true if a network failure with this code may be retried.
    ///
    /// Failures without a recognized code are never retried.
    #[must_use]
    pub fn is_retryable_code(&self, code: Option<NetworkErrorCode>) -> bool {
        code.is_some_and(|code| self.retryable_codes.contains(&code))
    }

    /// Returns true if calls with this method are retried by default.
    #[must_use]
    pub fn is_idempotent(&self, method: &Method) -> bool {
        self.idempotent_methods.contains(method)
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let exponential = self.base_backoff.saturating_mul(factor);

        let jitter_us = u64::try_from(self.jitter().as_micros()).unwrap_or(u64::MAX);
        if jitter_us == 0 {
            return exponential;
        }

        let jitter = rand::thread_rng().gen_range(0..jitter_us);
        exponential.saturating_add(Duration::from_micros(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.is_retryable_status(408));
        assert!(policy.is_retryable_status(429));
        assert!(policy.is_retryable_status(503));
        assert!(!policy.is_retryable_status(404));
        assert!(!policy.is_retryable_status(400));
        assert!(policy.is_retryable_code(Some(NetworkErrorCode::ConnectionReset)));
        assert!(!policy.is_retryable_code(None));
    }

    #[test]
    fn test_idempotent_methods() {
        let policy = RetryPolicy::default();
        assert!(policy.is_idempotent(&Method::GET));
        assert!(policy.is_idempotent(&Method::PUT));
        assert!(policy.is_idempotent(&Method::DELETE));
        assert!(!policy.is_idempotent(&Method::POST));
        assert!(!policy.is_idempotent(&Method::PATCH));
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(RetryPolicy::new().with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }

    #[test]
    fn test_server_errors_toggle() {
        let policy = RetryPolicy::new().with_server_errors(false);
        assert!(!policy.is_retryable_status(503));
        assert!(policy.is_retryable_status(429));
    }

    #[test]
    fn test_restricted_codes() {
        let policy = RetryPolicy::new().with_retryable_codes([NetworkErrorCode::TimedOut]);
        assert!(policy.is_retryable_code(Some(NetworkErrorCode::TimedOut)));
        assert!(!policy.is_retryable_code(Some(NetworkErrorCode::ConnectionRefused)));
    }

    #[test]
    fn test_jitter_clamped_to_base() {
        let policy = RetryPolicy::new()
            .with_base_backoff(Duration::from_millis(50))
            .with_jitter(Duration::from_secs(5));
        assert_eq!(policy.jitter(), Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_without_jitter_doubles() {
        let policy = RetryPolicy::new()
            .with_base_backoff(Duration::from_millis(100))
            .with_jitter(Duration::ZERO);

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new().with_jitter(Duration::ZERO);
        assert_eq!(policy.backoff(u32::MAX), policy.backoff(40));
    }

    proptest! {
        #[test]
        fn backoff_strictly_increases(
            base_ms in 1u64..2_000,
            jitter_ms in 0u64..5_000,
            attempt in 1u32..12,
        ) {
            let policy = RetryPolicy::new()
                .with_base_backoff(Duration::from_millis(base_ms))
                .with_jitter(Duration::from_millis(jitter_ms));

            prop_assert!(policy.backoff(attempt + 1) > policy.backoff(attempt));
        }
    }
}
