// control_system/mod.rs
pub mod deliberation;
pub mod threshold_learner;
pub mod traffic_light_controller;

pub use deliberation::{deliberate, plan, Beliefs, Desire, Intention, PhaseTimers};
pub use threshold_learner::ThresholdLearner;
pub use traffic_light_controller::{apply_safety_mask, TickOutcome, TrafficLightController};
