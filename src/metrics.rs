//! Request counters kept by the execution engine.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::limiter::lock;

/// Engine-wide request counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    pub auth_refreshes: u64,
    pub total_latency: Duration,
}

impl EngineMetrics {
    /// Mean latency of successful requests.
    pub fn average_latency(&self) -> Duration {
        match u32::try_from(self.successful_requests) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
        }
    }
}

/// Counters for one remote method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodMetrics {
    pub calls: u64,
    pub errors: u64,
    /// Failures since the last success.
    pub consecutive_errors: u64,
    pub last_error_code: Option<String>,
    pub total_latency: Duration,
}

#[derive(Debug, Default)]
struct MetricsState {
    engine: EngineMetrics,
    methods: HashMap<String, MethodMetrics>,
}

/// Thread-safe metrics registry.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    state: Mutex<MetricsState>,
}

impl Metrics {
    pub(crate) fn record_attempt(&self) {
        lock(&self.state).engine.total_requests += 1;
    }

    pub(crate) fn record_success(&self, method: &str, latency: Duration) {
        let mut state = lock(&self.state);
        state.engine.successful_requests += 1;
        state.engine.total_latency += latency;
        let entry = state.methods.entry(method.to_string()).or_default();
        entry.calls += 1;
        entry.consecutive_errors = 0;
        entry.total_latency += latency;
    }

    pub(crate) fn record_failure(&self, method: &str, code: &str) {
        let mut state = lock(&self.state);
        state.engine.failed_requests += 1;
        let entry = state.methods.entry(method.to_string()).or_default();
        entry.calls += 1;
        entry.errors += 1;
        entry.consecutive_errors += 1;
        entry.last_error_code = Some(code.to_string());
    }

    pub(crate) fn record_retry(&self) {
        lock(&self.state).engine.retries += 1;
    }

    pub(crate) fn record_auth_refresh(&self) {
        lock(&self.state).engine.auth_refreshes += 1;
    }

    pub(crate) fn engine(&self) -> EngineMetrics {
        lock(&self.state).engine.clone()
    }

    pub(crate) fn methods(&self) -> HashMap<String, MethodMetrics> {
        lock(&self.state).methods.clone()
    }

    pub(crate) fn reset(&self) {
        *lock(&self.state) = MetricsState::default();
    }
}
