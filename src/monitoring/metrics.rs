// monitoring/metrics.rs
use std::collections::VecDeque;
use std::time::Duration;

use crate::global_variables::LIVE_WAIT_WINDOW_SECS;
use crate::shared_data::{current_timestamp, MetricsRecord, NodeTelemetry, RunSummary};
use crate::simulation_engine::registry::ControlMode;

/// Destination for per-second metrics records.
pub trait MetricsSink {
    fn record(&mut self, record: &MetricsRecord);
}

/// Writes each record as one JSON line through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn record(&mut self, record: &MetricsRecord) {
        match serde_json::to_string(record) {
            Ok(line) => log::info!("{}", line),
            Err(e) => log::warn!("Failed to serialize metrics record: {}", e),
        }
    }
}

impl MetricsSink for Vec<MetricsRecord> {
    fn record(&mut self, record: &MetricsRecord) {
        self.push(record.clone());
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowSample {
    elapsed_secs: f64,
    total_wait: u64,
    total_passed: u64,
}

/// Grid-wide aggregation of node telemetry.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    window: VecDeque<WindowSample>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut window = VecDeque::new();
        window.push_back(WindowSample {
            elapsed_secs: 0.0,
            total_wait: 0,
            total_passed: 0,
        });
        Self { window }
    }

    /// Builds the record for `elapsed_secs`. The average wait is taken over
    /// the trailing window only: wait accrued divided by cars passed since
    /// the oldest sample still inside it.
    pub fn sample(&mut self, elapsed_secs: f64, mode: ControlMode, nodes: &[NodeTelemetry]) -> MetricsRecord {
        let total_wait: u64 = nodes.iter().map(|n| n.total_wait).sum();
        let total_passed: u64 = nodes.iter().map(|n| n.total_passed).sum();
        let total_co2: f64 = nodes.iter().map(|n| n.total_co2).sum();

        self.window.push_back(WindowSample {
            elapsed_secs,
            total_wait,
            total_passed,
        });
        while self.window.len() > 1
            && elapsed_secs - self.window[0].elapsed_secs > LIVE_WAIT_WINDOW_SECS
        {
            self.window.pop_front();
        }

        let oldest = self.window[0];
        let passed = total_passed.saturating_sub(oldest.total_passed);
        let average_wait = if passed == 0 {
            0.0
        } else {
            total_wait.saturating_sub(oldest.total_wait) as f64 / passed as f64
        };

        MetricsRecord {
            elapsed_secs,
            mode,
            throughput: total_passed,
            average_wait,
            total_co2,
            timestamp: current_timestamp(),
        }
    }

    /// End-of-run aggregates over the whole session.
    pub fn summary(
        &self,
        mode: ControlMode,
        nodes: &[NodeTelemetry],
        ambulance_trip: Option<Duration>,
    ) -> RunSummary {
        let throughput: u64 = nodes.iter().map(|n| n.total_passed).sum();
        let total_wait: u64 = nodes.iter().map(|n| n.total_wait).sum();
        let total_co2: f64 = nodes.iter().map(|n| n.total_co2).sum();
        let per_car = |value: f64| {
            if throughput == 0 {
                0.0
            } else {
                value / throughput as f64
            }
        };
        let global_average_queue = if nodes.is_empty() {
            0.0
        } else {
            nodes.iter().map(|n| n.average_queue).sum::<f64>() / nodes.len() as f64
        };

        RunSummary {
            mode,
            throughput,
            session_average_wait: per_car(total_wait as f64),
            global_average_queue,
            co2_per_car: per_car(total_co2),
            ambulance_trip_secs: ambulance_trip.map(|d| d.as_secs_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::intersections::IntersectionId;

    fn telemetry(col: i8, passed: u64, wait: u64, co2: f64, average_queue: f64) -> NodeTelemetry {
        NodeTelemetry {
            id: IntersectionId(0, col),
            coordinates: (0, 0),
            queue_ns: 0,
            queue_ew: 0,
            green_ns: true,
            in_transition: false,
            pheromone: 0.0,
            adaptive_threshold: 10,
            sensors_ok: true,
            total_passed: passed,
            average_queue,
            average_wait: 0.0,
            total_co2: co2,
            total_wait: wait,
        }
    }

    #[test]
    fn record_sums_across_nodes() {
        let mut collector = MetricsCollector::new();
        let nodes = [telemetry(0, 4, 20, 1.5, 0.0), telemetry(1, 6, 10, 2.5, 0.0)];
        let record = collector.sample(1.0, ControlMode::Stigmergy, &nodes);
        assert_eq!(record.throughput, 10);
        assert_eq!(record.average_wait, 3.0);
        assert_eq!(record.total_co2, 4.0);
        assert_eq!(record.mode, ControlMode::Stigmergy);
    }

    #[test]
    fn live_wait_forgets_samples_older_than_the_window() {
        let mut collector = MetricsCollector::new();
        // A slow start: 100 wait units for 1 car.
        collector.sample(1.0, ControlMode::FixedCycle, &[telemetry(0, 1, 100, 0.0, 0.0)]);
        for t in 2..=7 {
            let passed = 1 + (t - 1) * 10;
            let wait = 100 + (t - 1) * 10;
            collector.sample(t as f64, ControlMode::FixedCycle, &[telemetry(0, passed, wait, 0.0, 0.0)]);
        }
        // Window now starts at t=2: 50 more wait for 50 more cars.
        let record = collector.sample(7.0, ControlMode::FixedCycle, &[telemetry(0, 61, 160, 0.0, 0.0)]);
        assert_eq!(record.average_wait, 1.0);
    }

    #[test]
    fn nothing_passed_means_zero_wait() {
        let mut collector = MetricsCollector::new();
        let record = collector.sample(1.0, ControlMode::FixedCycle, &[telemetry(0, 0, 40, 0.0, 0.0)]);
        assert_eq!(record.average_wait, 0.0);
    }

    #[test]
    fn summary_aggregates_the_session() {
        let collector = MetricsCollector::new();
        let nodes = [telemetry(0, 10, 30, 5.0, 2.0), telemetry(1, 10, 10, 3.0, 4.0)];
        let summary = collector.summary(
            ControlMode::GreenWave,
            &nodes,
            Some(Duration::from_millis(1500)),
        );
        assert_eq!(summary.throughput, 20);
        assert_eq!(summary.session_average_wait, 2.0);
        assert_eq!(summary.global_average_queue, 3.0);
        assert_eq!(summary.co2_per_car, 0.4);
        assert_eq!(summary.ambulance_trip_secs, Some(1.5));
    }

    #[test]
    fn empty_summary_has_no_division_by_zero() {
        let summary = MetricsCollector::new().summary(ControlMode::FixedCycle, &[], None);
        assert_eq!(summary.throughput, 0);
        assert_eq!(summary.session_average_wait, 0.0);
        assert_eq!(summary.global_average_queue, 0.0);
        assert_eq!(summary.ambulance_trip_secs, None);
    }

    #[test]
    fn vec_sink_collects_records() {
        let mut sink: Vec<MetricsRecord> = Vec::new();
        let record = MetricsCollector::new().sample(1.0, ControlMode::FixedCycle, &[]);
        sink.record(&record);
        LogSink.record(&record);
        assert_eq!(sink, vec![record]);
    }
}
