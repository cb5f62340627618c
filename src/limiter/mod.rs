//! Admission control for outbound calls.
//!
//! Three limiters cooperate behind [`RestrictionManager`]:
//!
//! - [`RateLimiter`]: a leaky bucket over the account's call rate that tightens itself after
//!   repeated rate-limit errors and relaxes again after sustained success.
//! - [`OperatingLimiter`]: tracks the execution-time budget the server reports per method and
//!   predicts when a method is locked out.
//! - [`AdaptiveDelayer`]: inserts advisory pauses while a method approaches its budget.

mod adaptive;
mod manager;
mod operating;
mod params;
mod rate;

pub use adaptive::{AdaptiveDelayer, AdaptiveStats};
pub use manager::{RestrictionManager, RestrictionStats, RetryDecision};
pub use operating::{MethodStats, OperatingLimiter, OperatingStats};
pub use params::{AdaptiveConfig, OperatingLimitConfig, RateLimitConfig, RestrictionParams};
pub use rate::{RateLimiter, RateLimiterStats};

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix under which batch sub-commands report their statistics.
pub const BATCH_PREFIX: &str = "batch::";

/// Locks a statistics mutex. The guarded maps stay consistent across a panic, so poisoning is
/// ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Statistics keys of every distinct sub-method in an outgoing batch payload.
pub(crate) fn batch_keys(params: &serde_json::Value) -> Vec<String> {
    crate::batch::sub_methods(params)
        .into_iter()
        .map(|method| format!("{BATCH_PREFIX}{method}"))
        .collect()
}
