//! Retry policy primitives: which error codes are terminal, and how backoff grows.

use std::time::Duration;

use crate::error::codes;

/// Error codes that are surfaced immediately and never retried.
pub const NON_RETRYABLE_CODES: &[&str] = &[
    codes::ACCESS_DENIED,
    codes::INVALID_CREDENTIALS,
    codes::NOT_FOUND,
    codes::INVALID_REQUEST,
    codes::ERROR_METHOD_NOT_FOUND,
    codes::ERROR_MANIFEST_IS_NOT_AVAILABLE,
    codes::ERROR_BATCH_LENGTH_EXCEEDED,
    codes::ERROR_BATCH_EMPTY,
    codes::ERROR_BATCH_METHOD_NOT_ALLOWED,
    codes::NO_AUTH_FOUND,
    codes::INVALID_PARAMS,
    codes::INSUFFICIENT_SCOPE,
    codes::EXPIRED_TOKEN,
    codes::INVALID_TOKEN,
    codes::INVALID_GRANT,
];

/// Returns `true` if `code` is on the do-not-retry list.
pub fn is_non_retryable(code: &str) -> bool {
    NON_RETRYABLE_CODES.contains(&code)
}

/// Geometric backoff: `base * factor^attempt`.
///
/// # Examples
///
/// ```
/// use rpcwarden::retry::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::exponential(Duration::from_millis(100));
/// assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
/// assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay for attempt `0`.
    pub base: Duration,
    /// Growth per attempt.
    pub factor: f64,
}

impl Backoff {
    pub fn new(base: Duration, factor: f64) -> Self {
        Self { base, factor }
    }

    /// Doubling backoff.
    pub fn exponential(base: Duration) -> Self {
        Self::new(base, 2.0)
    }

    /// Returns the delay for the given zero-based attempt.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = self.factor.powi(exponent);
        let millis = (self.base.as_millis() as f64 * multiplier).round();
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_millis(millis as u64)
    }
}
