use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::simulation_engine::registry::ControlMode;

/// Event injected once, half-way through an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scenario {
    #[default]
    None,
    /// Sensor fault at the corner node.
    FailCorner,
    /// Sensor fault at the centre node.
    FailCenter,
    /// Ambulance entering at the top-middle node.
    Ambulance,
}

/// Experiment configuration. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Wall-clock length of one tick.
    pub tick_millis: u64,
    /// Experiment length in simulated seconds (ticks).
    pub duration_secs: f64,
    pub mode: ControlMode,
    pub highway_prob: u8,
    pub side_street_prob: u8,
    pub yellow_penalty: bool,
    pub scenario: Scenario,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            duration_secs: 60.0,
            mode: ControlMode::FixedCycle,
            highway_prob: 50,
            side_street_prob: 15,
            yellow_penalty: true,
            scenario: Scenario::None,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Reads a JSON config file and validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(raw)?;
        config.validate()
    }

    /// Clamps probabilities into 0..=100 and rejects unusable timing.
    pub fn validate(mut self) -> Result<Self> {
        if self.tick_millis == 0 {
            return Err(SimError::InvalidConfig("tick_millis must be positive".into()));
        }
        if !(self.duration_secs > 0.0) {
            return Err(SimError::InvalidConfig("duration_secs must be positive".into()));
        }
        self.highway_prob = self.highway_prob.min(100);
        self.side_street_prob = self.side_street_prob.min(100);
        Ok(self)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Number of ticks the experiment runs for.
    pub fn total_ticks(&self) -> u64 {
        self.duration_secs.ceil() as u64
    }
}
