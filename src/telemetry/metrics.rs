//! Metrics
//!
//! Per-endpoint request aggregates keyed by `"METHOD PATH"`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Aggregate for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointMetrics {
    pub total_requests: u64,
    /// Responses with status >= 400 plus transport failures.
    pub total_errors: u64,
    pub total_latency: Duration,
}

impl EndpointMetrics {
    pub fn average_latency(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_latency.as_nanos() / u128::from(self.total_requests);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_errors as f64 / self.total_requests as f64
        }
    }
}

/// Observer called after every update with the endpoint and its new aggregate.
///
/// Observers run inline on the recording task, after the metrics lock has
/// been released.
pub type MetricsObserver = Arc<dyn Fn(&str, &EndpointMetrics) + Send + Sync>;

#[derive(Default)]
struct MetricsState {
    endpoints: HashMap<String, EndpointMetrics>,
    observers: Vec<MetricsObserver>,
}

/// Thread-safe metrics collector.
#[derive(Default)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&str, &EndpointMetrics) + Send + Sync + 'static,
    {
        self.state.lock().observers.push(Arc::new(observer));
    }

    /// Record one completed request.
    pub fn record(&self, endpoint: &str, latency: Duration, is_error: bool) {
        let (snapshot, observers) = {
            let mut state = self.state.lock();
            let entry = state.endpoints.entry(endpoint.to_string()).or_default();
            entry.total_requests += 1;
            entry.total_latency = entry.total_latency.saturating_add(latency);
            if is_error {
                entry.total_errors += 1;
            }
            let snapshot = entry.clone();
            (snapshot, state.observers.clone())
        };

        for observer in &observers {
            observer(endpoint, &snapshot);
        }
    }

    /// Aggregate for one endpoint.
    pub fn get(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.state.lock().endpoints.get(endpoint).cloned()
    }

    /// Copy of all aggregates.
    pub fn snapshot(&self) -> HashMap<String, EndpointMetrics> {
        self.state.lock().endpoints.clone()
    }

    /// Drop all aggregates. Observers stay registered.
    pub fn reset(&self) {
        self.state.lock().endpoints.clear();
    }
}
