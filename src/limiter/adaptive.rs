//! Advisory pacing for methods trending toward their operating budget.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::operating::OperatingLimiter;
use super::params::AdaptiveConfig;
use super::{batch_keys, lock, now_ms};

/// Delay used when the budget reset time has already passed.
const STALE_RESET_DELAY: Duration = Duration::from_secs(7);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptiveStats {
    pub delays: u64,
    pub total_delay_ms: u64,
}

/// Suggests pauses before a method's budget runs out. It never refuses a call.
pub struct AdaptiveDelayer {
    config: Mutex<AdaptiveConfig>,
    operating: Arc<OperatingLimiter>,
    stats: Mutex<AdaptiveStats>,
}

impl AdaptiveDelayer {
    /// Creates a delayer reading usage from `operating`.
    pub fn new(config: AdaptiveConfig, operating: Arc<OperatingLimiter>) -> Self {
        Self {
            config: Mutex::new(config),
            operating,
            stats: Mutex::new(AdaptiveStats::default()),
        }
    }

    /// Always `true`: the delayer only paces.
    pub fn can_proceed(&self) -> bool {
        true
    }

    /// The pause suggested before calling `method`; the longest over sub-methods for `"batch"`.
    pub fn wait_if_needed(&self, method: &str, params: &Value) -> Duration {
        let config = lock(&self.config).clone();
        if !config.enabled {
            return Duration::ZERO;
        }

        let delay = if method == "batch" {
            batch_keys(params)
                .iter()
                .map(|key| self.delay_for(key, &config))
                .max()
                .unwrap_or(Duration::ZERO)
        } else {
            self.delay_for(method, &config)
        };

        if !delay.is_zero() {
            let mut stats = lock(&self.stats);
            stats.delays += 1;
            stats.total_delay_ms += delay.as_millis() as u64;
        }
        delay
    }

    fn delay_for(&self, method: &str, config: &AdaptiveConfig) -> Duration {
        let Some(usage) = self.operating.usage_percent(method) else {
            return Duration::ZERO;
        };
        if usage <= config.threshold_percent {
            return Duration::ZERO;
        }
        let Some(stats) = self.operating.method_stats(method) else {
            return Duration::ZERO;
        };

        let now = now_ms();
        let delay = if stats.operating_reset_at_ms > now {
            let millis = (stats.operating_reset_at_ms - now) as f64 * config.coefficient;
            Duration::from_millis(millis.max(0.0).round() as u64)
        } else {
            STALE_RESET_DELAY
        };
        let delay = delay.min(Duration::from_millis(config.max_delay_ms));

        tracing::debug!(
            method = %method,
            usage_percent = usage,
            delay_ms = delay.as_millis() as u64,
            "Adaptive delay before call"
        );
        delay
    }

    pub fn set_config(&self, config: AdaptiveConfig) {
        *lock(&self.config) = config;
    }

    pub fn stats(&self) -> AdaptiveStats {
        lock(&self.stats).clone()
    }

    pub fn reset_stats(&self) {
        *lock(&self.stats) = AdaptiveStats::default();
    }
}
