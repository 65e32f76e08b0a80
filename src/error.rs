use thiserror::Error;

use crate::simulation_engine::intersections::IntersectionId;

/// Errors surfaced by the simulation core.
///
/// Capacity refusals and sensor faults are normal operating states and are
/// never reported through this type.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Unknown intersection: {0}")]
    UnknownIntersection(IntersectionId),

    #[error("Malformed node id: {0}")]
    MalformedNodeId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
