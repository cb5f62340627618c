//! One admission and backoff policy over the three limiters.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::adaptive::{AdaptiveDelayer, AdaptiveStats};
use super::operating::{OperatingLimiter, OperatingStats};
use super::params::RestrictionParams;
use super::rate::{RateLimiter, RateLimiterStats};
use super::{lock, BATCH_PREFIX};
use crate::error::{AjaxError, ErrorKind};
use crate::result::PayloadTime;
use crate::retry::Backoff;

/// Floor for the wait after an operating-limit error.
const OPERATING_LIMIT_MIN_WAIT: Duration = Duration::from_secs(10);
/// Growth of the rate-limit wait per attempt.
const RATE_LIMIT_BACKOFF_FACTOR: f64 = 1.5;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then try again.
    Retry(Duration),
    /// Surface the error.
    Stop,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    retries: u64,
    rate_limit_errors: u64,
    operating_limit_errors: u64,
    operating_waits: u64,
    rate_waits: u64,
    total_wait_ms: u64,
}

/// Aggregated statistics of the restriction layer.
#[derive(Debug, Clone)]
pub struct RestrictionStats {
    pub retries: u64,
    pub rate_limit_errors: u64,
    pub operating_limit_errors: u64,
    pub operating_waits: u64,
    pub rate_waits: u64,
    pub total_wait_ms: u64,
    pub rate_limiter: RateLimiterStats,
    pub operating: OperatingStats,
    pub adaptive: AdaptiveStats,
}

/// Sequences the limiters in front of every call and turns failures into retry delays.
pub struct RestrictionManager {
    params: Mutex<RestrictionParams>,
    rate: RateLimiter,
    operating: Arc<OperatingLimiter>,
    adaptive: AdaptiveDelayer,
    counters: Mutex<Counters>,
}

impl RestrictionManager {
    pub fn new(params: RestrictionParams) -> Self {
        let operating = Arc::new(OperatingLimiter::new(params.operating_limit.clone()));
        Self {
            rate: RateLimiter::new(params.rate_limit.clone()),
            adaptive: AdaptiveDelayer::new(params.adaptive.clone(), operating.clone()),
            operating,
            params: Mutex::new(params),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn params(&self) -> RestrictionParams {
        lock(&self.params).clone()
    }

    pub fn max_retries(&self) -> usize {
        lock(&self.params).max_retries
    }

    /// Swaps in a new configuration. Method statistics survive; the rate limiter's histories
    /// restart.
    pub async fn set_config(&self, params: RestrictionParams) {
        self.rate.set_config(params.rate_limit.clone()).await;
        self.operating.set_config(params.operating_limit.clone());
        self.adaptive.set_config(params.adaptive.clone());
        *lock(&self.params) = params;
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate
    }

    pub fn operating_limiter(&self) -> &OperatingLimiter {
        &self.operating
    }

    pub fn adaptive_delayer(&self) -> &AdaptiveDelayer {
        &self.adaptive
    }

    /// Waits until `method` may be sent. Returns the total time slept.
    ///
    /// An operating-limit wait replaces the adaptive pause; the rate limiter is always consulted
    /// last and re-checked until it admits the call.
    pub async fn wait_before(&self, method: &str, params: &Value) -> Duration {
        let mut waited = Duration::ZERO;

        let operating_wait = self.operating.time_to_free(method, params);
        if !operating_wait.is_zero() {
            tracing::warn!(
                method = %method,
                delay_ms = operating_wait.as_millis() as u64,
                "Operating limit reached - waiting for budget reset"
            );
            lock(&self.counters).operating_waits += 1;
            tokio::time::sleep(operating_wait).await;
            waited += operating_wait;
        } else {
            let adaptive_wait = self.adaptive.wait_if_needed(method, params);
            if !adaptive_wait.is_zero() {
                tokio::time::sleep(adaptive_wait).await;
                waited += adaptive_wait;
            }
        }

        loop {
            let rate_wait = self.rate.wait_if_needed().await;
            if rate_wait.is_zero() {
                break;
            }
            tracing::debug!(
                method = %method,
                delay_ms = rate_wait.as_millis() as u64,
                "Rate limit bucket empty - waiting for a token"
            );
            lock(&self.counters).rate_waits += 1;
            tokio::time::sleep(rate_wait).await;
            waited += rate_wait;
        }

        lock(&self.counters).total_wait_ms += waited.as_millis() as u64;
        waited
    }

    /// Maps a failed attempt (zero-based) to a retry decision.
    pub async fn handle_error(
        &self,
        error: &AjaxError,
        attempt: usize,
        method: &str,
        params: &Value,
    ) -> RetryDecision {
        let decision = match error.kind() {
            ErrorKind::RateLimit => {
                lock(&self.counters).rate_limit_errors += 1;
                let base = self.rate.handle_exceeded().await;
                RetryDecision::Retry(
                    Backoff::new(base, RATE_LIMIT_BACKOFF_FACTOR).delay_for_attempt(attempt),
                )
            }
            ErrorKind::OperatingLimit => {
                lock(&self.counters).operating_limit_errors += 1;
                let free_in = self.operating.time_to_free(method, params);
                RetryDecision::Retry(free_in.max(OPERATING_LIMIT_MIN_WAIT))
            }
            ErrorKind::Fatal | ErrorKind::Auth => RetryDecision::Stop,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Unknown => {
                let base = lock(&self.params).retry_delay();
                RetryDecision::Retry(Backoff::exponential(base).delay_for_attempt(attempt))
            }
        };

        if matches!(decision, RetryDecision::Retry(_)) {
            lock(&self.counters).retries += 1;
        }
        decision
    }

    /// Feeds the timing of a successful call to the limiters.
    ///
    /// Batch sub-commands (`batch::<method>`) update the operating statistics only: the call that
    /// carried them was already counted by the rate limiter.
    pub async fn update_stats(&self, method: &str, time: &PayloadTime) {
        self.operating.update_stats(method, time);
        if !method.starts_with(BATCH_PREFIX) {
            self.rate.record_success().await;
        }
    }

    pub async fn stats(&self) -> RestrictionStats {
        let counters = lock(&self.counters).clone();
        RestrictionStats {
            retries: counters.retries,
            rate_limit_errors: counters.rate_limit_errors,
            operating_limit_errors: counters.operating_limit_errors,
            operating_waits: counters.operating_waits,
            rate_waits: counters.rate_waits,
            total_wait_ms: counters.total_wait_ms,
            rate_limiter: self.rate.stats().await,
            operating: self.operating.stats(),
            adaptive: self.adaptive.stats(),
        }
    }

    pub async fn reset_stats(&self) {
        *lock(&self.counters) = Counters::default();
        self.rate.reset_stats().await;
        self.operating.reset_stats();
        self.adaptive.reset_stats();
    }
}
