// monitoring/mod.rs
pub mod metrics;

pub use metrics::{LogSink, MetricsCollector, MetricsSink};
