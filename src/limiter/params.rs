//! Replaceable configuration snapshot for the limiters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Leaky-bucket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Bucket capacity in calls.
    pub burst_limit: f64,
    /// Refill rate in calls per second.
    pub drain_rate: f64,
    /// Whether the limiter tightens and relaxes itself.
    pub adaptive_enabled: bool,
    /// Floor for `burst_limit` when tightening.
    pub min_burst_limit: f64,
    /// Floor for `drain_rate` when tightening.
    pub min_drain_rate: f64,
    /// Rate-limit errors within 60 s that trigger tightening.
    pub error_threshold: usize,
    /// Successes within 60 s that allow relaxing.
    pub success_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_limit: 50.0,
            drain_rate: 2.0,
            adaptive_enabled: true,
            min_burst_limit: 10.0,
            min_drain_rate: 0.5,
            error_threshold: 5,
            success_threshold: 20,
        }
    }
}

impl RateLimitConfig {
    /// Time for one token to accrue.
    pub fn refill_interval(&self) -> Duration {
        if self.drain_rate > 0.0 {
            Duration::from_millis((1000.0 / self.drain_rate).ceil() as u64)
        } else {
            Duration::from_secs(1)
        }
    }
}

/// Per-method execution-time budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatingLimitConfig {
    /// Length of the rolling window the server budgets over.
    pub window_ms: u64,
    /// Execution time allowed per method within the window.
    pub limit_ms: u64,
    /// Usage percentage above which a method counts as heavy.
    pub heavy_percent: f64,
}

impl Default for OperatingLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 600_000,
            limit_ms: 480_000,
            heavy_percent: 80.0,
        }
    }
}

/// Anticipatory pacing before a method hits its budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdaptiveConfig {
    pub enabled: bool,
    /// Usage percentage of the operating limit above which delays start.
    pub threshold_percent: f64,
    /// Fraction of the time-to-reset to wait.
    pub coefficient: f64,
    pub max_delay_ms: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_percent: 80.0,
            coefficient: 0.01,
            max_delay_ms: 7_000,
        }
    }
}

/// Everything the restriction layer is configured with.
///
/// # Examples
///
/// ```
/// use rpcwarden::limiter::RestrictionParams;
///
/// let params: RestrictionParams =
///     serde_json::from_str(r#"{"maxRetries": 5, "rateLimit": {"drainRate": 5.0}}"#).unwrap();
/// assert_eq!(params.max_retries, 5);
/// assert_eq!(params.rate_limit.drain_rate, 5.0);
/// assert_eq!(params.rate_limit.burst_limit, 50.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestrictionParams {
    pub rate_limit: RateLimitConfig,
    pub operating_limit: OperatingLimitConfig,
    #[serde(rename = "adaptiveConfig")]
    pub adaptive: AdaptiveConfig,
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Base delay of the generic exponential backoff.
    pub retry_delay_ms: u64,
}

impl Default for RestrictionParams {
    fn default() -> Self {
        Self::standard()
    }
}

impl RestrictionParams {
    /// Limits of a standard account: 2 calls/s with bursts of 50.
    pub fn standard() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            operating_limit: OperatingLimitConfig::default(),
            adaptive: AdaptiveConfig::default(),
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }

    /// Limits of an enterprise account: 5 calls/s with bursts of 250.
    pub fn enterprise() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                burst_limit: 250.0,
                drain_rate: 5.0,
                min_burst_limit: 50.0,
                min_drain_rate: 1.0,
                ..RateLimitConfig::default()
            },
            ..Self::standard()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
