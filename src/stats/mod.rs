//! Statistics and metrics for the gateway

pub mod metrics;

pub use metrics::{GatewayMetrics, MetricsSnapshot};
