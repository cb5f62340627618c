//! Leaky-bucket admission with adaptive tightening.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::params::RateLimitConfig;

/// Span of the error and success histories.
const HISTORY_WINDOW: Duration = Duration::from_secs(60);

/// Extra wait added to one refill interval after a rate-limit error.
const EXCEEDED_PENALTY: Duration = Duration::from_secs(1);

/// Snapshot of the bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterStats {
    pub tokens: f64,
    pub burst_limit: f64,
    pub drain_rate: f64,
    pub recent_errors: usize,
    pub recent_successes: usize,
    pub limit_hits: u64,
    pub tightenings: u64,
    pub relaxations: u64,
}

struct BucketState {
    /// Limits in force, possibly tightened.
    current: RateLimitConfig,
    /// Limits as configured.
    original: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
    errors: VecDeque<Instant>,
    successes: VecDeque<Instant>,
    limit_hits: u64,
    tightenings: u64,
    relaxations: u64,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.current.drain_rate).min(self.current.burst_limit);
        self.last_refill = now;
    }

    fn prune_history(&mut self, now: Instant) {
        for history in [&mut self.errors, &mut self.successes] {
            while let Some(&at) = history.front() {
                if now.saturating_duration_since(at) < HISTORY_WINDOW {
                    break;
                }
                history.pop_front();
            }
        }
    }

    fn tighten(&mut self) {
        let current = &mut self.current;
        current.drain_rate = (current.drain_rate * 0.8).max(self.original.min_drain_rate);
        current.burst_limit = (current.burst_limit * 0.8).max(self.original.min_burst_limit);
        self.tokens = self.tokens.min(current.burst_limit);
        self.errors.clear();
        self.successes.clear();
        self.tightenings += 1;
        tracing::warn!(
            drain_rate = current.drain_rate,
            burst_limit = current.burst_limit,
            "Repeated rate-limit errors - tightening limits"
        );
    }

    fn relax(&mut self) {
        let current = &mut self.current;
        current.drain_rate = (current.drain_rate * 1.1).min(self.original.drain_rate);
        current.burst_limit = (current.burst_limit * 1.1).min(self.original.burst_limit);
        self.successes.clear();
        self.relaxations += 1;
        tracing::info!(
            drain_rate = current.drain_rate,
            burst_limit = current.burst_limit,
            "Sustained success - relaxing limits"
        );
    }

    fn is_tightened(&self) -> bool {
        self.current.drain_rate < self.original.drain_rate
            || self.current.burst_limit < self.original.burst_limit
    }
}

/// A token bucket over the account's call rate.
///
/// The bucket starts full. Every read-refill-consume sequence runs under one FIFO async lock,
/// so concurrent callers can never spend the same token twice.
///
/// # Examples
///
/// ```
/// use rpcwarden::limiter::{RateLimitConfig, RateLimiter};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = RateLimiter::new(RateLimitConfig {
///     burst_limit: 1.0,
///     ..RateLimitConfig::default()
/// });
/// assert!(limiter.wait_if_needed().await.is_zero());
/// assert!(!limiter.wait_if_needed().await.is_zero());
/// # }
/// ```
pub struct RateLimiter {
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.burst_limit,
                current: config.clone(),
                original: config,
                last_refill: Instant::now(),
                errors: VecDeque::new(),
                successes: VecDeque::new(),
                limit_hits: 0,
                tightenings: 0,
                relaxations: 0,
            }),
        }
    }

    /// Consumes a token if one is available and returns zero; otherwise returns how long until
    /// one accrues. Nothing is consumed in the second case, so callers loop until they get zero.
    pub async fn wait_if_needed(&self) -> Duration {
        let mut state = self.state.lock().await;
        state.refill(Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Duration::ZERO;
        }
        let missing = 1.0 - state.tokens;
        let rate = state.current.drain_rate.max(f64::EPSILON);
        Duration::from_millis((missing / rate * 1000.0).ceil() as u64)
    }

    /// Records a rate-limit error, empties the bucket and returns the wait before retrying.
    pub async fn handle_exceeded(&self) -> Duration {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.prune_history(now);
        state.errors.push_back(now);
        state.limit_hits += 1;
        state.tokens = 0.0;
        state.last_refill = now;

        if state.original.adaptive_enabled && state.errors.len() >= state.original.error_threshold {
            state.tighten();
        }

        state.current.refill_interval() + EXCEEDED_PENALTY
    }

    /// Records a successful call and relaxes tightened limits after sustained success.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.prune_history(now);
        state.successes.push_back(now);

        let quiet = (state.errors.len() as f64) < state.original.error_threshold as f64 / 2.0;
        if state.original.adaptive_enabled
            && state.successes.len() >= state.original.success_threshold
            && quiet
            && state.is_tightened()
        {
            state.relax();
        }
    }

    /// Replaces the configuration. Histories restart and surplus tokens above the new capacity
    /// are dropped.
    pub async fn set_config(&self, config: RateLimitConfig) {
        let mut state = self.state.lock().await;
        state.refill(Instant::now());
        state.tokens = state.tokens.min(config.burst_limit);
        state.current = config.clone();
        state.original = config;
        state.errors.clear();
        state.successes.clear();
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.refill(now);
        state.prune_history(now);
        RateLimiterStats {
            tokens: state.tokens,
            burst_limit: state.current.burst_limit,
            drain_rate: state.current.drain_rate,
            recent_errors: state.errors.len(),
            recent_successes: state.successes.len(),
            limit_hits: state.limit_hits,
            tightenings: state.tightenings,
            relaxations: state.relaxations,
        }
    }

    pub async fn reset_stats(&self) {
        let mut state = self.state.lock().await;
        state.limit_hits = 0;
        state.tightenings = 0;
        state.relaxations = 0;
    }
}
