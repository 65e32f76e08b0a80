// src/shared_data.rs

use crate::simulation_engine::intersections::{IntersectionId, IntersectionState};
use crate::simulation_engine::registry::ControlMode;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Read-only view of one node for rendering and reporting.
/// Queue lengths carry the fault sentinel (-1) while sensors are down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTelemetry {
    pub id: IntersectionId,
    pub coordinates: (i32, i32),
    pub queue_ns: i32,
    pub queue_ew: i32,
    pub green_ns: bool,
    pub in_transition: bool,
    pub pheromone: f64,
    pub adaptive_threshold: i32,
    pub sensors_ok: bool,
    pub total_passed: u64,
    pub average_queue: f64,
    pub average_wait: f64,
    pub total_co2: f64,
    /// Raw accumulated wait, used for grid-wide averages.
    pub total_wait: u64,
}

impl NodeTelemetry {
    pub fn from_state(state: &IntersectionState) -> Self {
        Self {
            id: state.id,
            coordinates: state.coordinates,
            queue_ns: state.queue_ns(),
            queue_ew: state.queue_ew(),
            green_ns: state.is_ns_green(),
            in_transition: state.is_in_transition(),
            pheromone: state.pheromone(),
            adaptive_threshold: state.adaptive_threshold(),
            sensors_ok: state.sensors_ok(),
            total_passed: state.metrics().cars_passed,
            average_queue: state.average_queue(),
            average_wait: state.average_wait(),
            total_co2: state.metrics().co2_sum,
            total_wait: state.metrics().wait_time_sum,
        }
    }
}

/// One metrics sample, emitted once per simulated second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub elapsed_secs: f64,
    pub mode: ControlMode,
    pub throughput: u64,
    pub average_wait: f64,
    pub total_co2: f64,
    pub timestamp: u64,
}

/// End-of-run aggregates across the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: ControlMode,
    pub throughput: u64,
    pub session_average_wait: f64,
    pub global_average_queue: f64,
    pub co2_per_car: f64,
    pub ambulance_trip_secs: Option<f64>,
}

/// Seconds since the unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
