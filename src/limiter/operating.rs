//! Per-method execution-time budget tracking.

use moka::sync::Cache;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

use super::params::OperatingLimitConfig;
use super::{batch_keys, lock, now_ms};
use crate::result::PayloadTime;

/// Headroom kept below the operating limit before a method is treated as locked.
const SAFETY_BUFFER_MS: u64 = 5_000;
/// Grace added to the window before statistics are forgotten.
const STATS_GRACE: Duration = Duration::from_secs(10);
const MIN_WAIT: Duration = Duration::from_secs(1);
/// Wait used when a locked method's reset time has already passed.
const STALE_RESET_WAIT: Duration = Duration::from_secs(5);

/// Last operating figures the server reported for a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodStats {
    pub operating_ms: u64,
    pub operating_reset_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingStats {
    pub tracked_methods: usize,
    pub heavy_requests: u64,
}

struct OperatingState {
    config: OperatingLimitConfig,
    /// Last figures per method, forgotten `stats_ttl` after their last write.
    stats: Cache<String, MethodStats>,
    stats_ttl: Duration,
    heavy_requests: u64,
}

/// Predicts when a method is locked out by its execution-time budget.
pub struct OperatingLimiter {
    state: Mutex<OperatingState>,
}

impl OperatingLimiter {
    pub fn new(config: OperatingLimitConfig) -> Self {
        let ttl = stats_ttl(&config);
        Self::with_stats_ttl(config, ttl)
    }

    fn with_stats_ttl(config: OperatingLimitConfig, stats_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(OperatingState {
                config,
                stats: stats_cache(stats_ttl),
                stats_ttl,
                heavy_requests: 0,
            }),
        }
    }

    /// How long to wait before `method` may be called.
    ///
    /// For `"batch"` this is the longest wait among the batch's sub-methods, read from `params`.
    pub fn time_to_free(&self, method: &str, params: &Value) -> Duration {
        if method == "batch" {
            return batch_keys(params)
                .iter()
                .map(|key| self.time_to_free_single(key))
                .max()
                .unwrap_or(Duration::ZERO);
        }
        self.time_to_free_single(method)
    }

    fn time_to_free_single(&self, method: &str) -> Duration {
        let state = lock(&self.state);
        let threshold = state.config.limit_ms.saturating_sub(SAFETY_BUFFER_MS);
        let Some(stats) = state.stats.get(method) else {
            return Duration::ZERO;
        };
        if stats.operating_ms < threshold {
            return Duration::ZERO;
        }

        let now = now_ms();
        if stats.operating_reset_at_ms > now {
            let until_reset = Duration::from_millis(stats.operating_reset_at_ms - now);
            (until_reset + MIN_WAIT).max(MIN_WAIT)
        } else {
            STALE_RESET_WAIT
        }
    }

    /// Stores the figures of a completed call. The server reports the running total, so the new
    /// figures replace the old ones. Returns `true` when the method counts as heavy.
    pub fn update_stats(&self, method: &str, time: &PayloadTime) -> bool {
        let mut state = lock(&self.state);
        let stats = MethodStats {
            operating_ms: time.operating_ms(),
            operating_reset_at_ms: time.operating_reset_at_ms(),
        };
        state.stats.insert(method.to_string(), stats);

        let usage = usage_percent(stats.operating_ms, state.config.limit_ms);
        let heavy = usage > state.config.heavy_percent;
        if heavy {
            state.heavy_requests += 1;
            tracing::warn!(
                method = %method,
                operating_ms = stats.operating_ms,
                usage_percent = usage,
                "Method is close to its operating limit"
            );
        }
        heavy
    }

    pub fn method_stats(&self, method: &str) -> Option<MethodStats> {
        lock(&self.state).stats.get(method)
    }

    /// Share of the operating limit `method` has consumed, in percent.
    pub fn usage_percent(&self, method: &str) -> Option<f64> {
        let state = lock(&self.state);
        state
            .stats
            .get(method)
            .map(|stats| usage_percent(stats.operating_ms, state.config.limit_ms))
    }

    /// Replaces the configuration, keeping the statistics gathered so far.
    ///
    /// A changed window rebuilds the statistics cache with the new lifetime; live entries are
    /// carried over and start a fresh lifetime.
    pub fn set_config(&self, config: OperatingLimitConfig) {
        let mut state = lock(&self.state);
        let ttl = stats_ttl(&config);
        if ttl != state.stats_ttl {
            let rebuilt = stats_cache(ttl);
            for (method, stats) in state.stats.iter() {
                rebuilt.insert(method.as_ref().clone(), stats);
            }
            state.stats = rebuilt;
            state.stats_ttl = ttl;
        }
        state.config = config;
    }

    pub fn stats(&self) -> OperatingStats {
        let state = lock(&self.state);
        OperatingStats {
            tracked_methods: state.stats.iter().count(),
            heavy_requests: state.heavy_requests,
        }
    }

    pub fn reset_stats(&self) {
        let mut state = lock(&self.state);
        state.stats.invalidate_all();
        state.stats.run_pending_tasks();
        state.heavy_requests = 0;
    }
}

fn stats_ttl(config: &OperatingLimitConfig) -> Duration {
    Duration::from_millis(config.window_ms) + STATS_GRACE
}

fn stats_cache(ttl: Duration) -> Cache<String, MethodStats> {
    Cache::builder().time_to_live(ttl).build()
}

fn usage_percent(operating_ms: u64, limit_ms: u64) -> f64 {
    if limit_ms == 0 {
        return 100.0;
    }
    operating_ms as f64 / limit_ms as f64 * 100.0
}
