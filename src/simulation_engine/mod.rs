// simulation_engine/mod.rs
pub mod grid;
pub mod intersections;
pub mod registry;
pub mod simulation;
