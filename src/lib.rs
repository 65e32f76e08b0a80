pub mod communication;
pub mod config;
pub mod control_system;
pub mod error;
pub mod global_variables;
pub mod learning;
pub mod monitoring;
pub mod shared_data;
pub mod simulation_engine;

pub use config::{Scenario, SimulationConfig};
pub use error::{Result, SimError};
pub use simulation_engine::registry::{ControlMode, Registry};
pub use simulation_engine::simulation::Simulation;
