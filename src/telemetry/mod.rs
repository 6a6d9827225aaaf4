//! Telemetry
//!
//! Subscriber setup and request metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LogFormat, LogLevel, LoggingConfig};
pub use metrics::{EndpointMetrics, MetricsCollector, MetricsObserver};
