// simulation.rs
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::{Scenario, SimulationConfig};
use crate::control_system::traffic_light_controller::{TickOutcome, TrafficLightController};
use crate::error::{Result, SimError};
use crate::global_variables::{AMBULANCE_ENTRY_NODE, CENTER_NODE, CORNER_NODE};
use crate::monitoring::metrics::{MetricsCollector, MetricsSink};
use crate::shared_data::RunSummary;
use crate::simulation_engine::grid::create_grid;
use crate::simulation_engine::intersections::IntersectionId;
use crate::simulation_engine::registry::Registry;

/// A registry plus one controller per grid node.
pub struct Simulation {
    registry: Arc<Registry>,
    controllers: Vec<TrafficLightController>,
}

impl Simulation {
    /// Builds the 3×3 grid and applies the config to the control surface.
    /// Controller `i` (row-major) is seeded with `seed + i`.
    pub fn bootstrap(config: &SimulationConfig) -> Result<Self> {
        let registry = Arc::new(Registry::new());
        registry.set_mode(config.mode);
        registry.set_traffic_params(config.highway_prob, config.side_street_prob);
        registry.set_yellow_penalty(config.yellow_penalty);

        let controllers = create_grid()?
            .iter()
            .enumerate()
            .map(|(index, setup)| {
                TrafficLightController::seeded(
                    Arc::clone(&registry),
                    setup,
                    config.seed.wrapping_add(index as u64),
                )
            })
            .collect();

        Ok(Self {
            registry,
            controllers,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn controllers(&self) -> &[TrafficLightController] {
        &self.controllers
    }

    /// Ticks every controller once, in id order. Failed ticks are logged and
    /// left out of the result.
    pub fn step_all(&mut self) -> Vec<TickOutcome> {
        self.controllers
            .iter_mut()
            .filter_map(TrafficLightController::tick_or_skip)
            .collect()
    }

    /// Runs one timed experiment: every controller on its own task, one
    /// metrics record per tick, and the configured scenario at half time.
    pub async fn run_experiment<S: MetricsSink>(self, config: &SimulationConfig, sink: &mut S) -> RunSummary {
        let Simulation {
            registry,
            controllers,
        } = self;
        let period = config.tick_period();
        let total_ticks = config.total_ticks();
        let trigger_at = (total_ticks / 2).max(1);

        log::info!(
            "Starting {} experiment: {} ticks of {:?}, scenario {:?}",
            registry.mode(),
            total_ticks,
            period,
            config.scenario
        );
        registry.set_running(true);
        let handles: Vec<JoinHandle<()>> = controllers
            .into_iter()
            .map(|controller| tokio::spawn(controller.run(period)))
            .collect();

        let mut collector = MetricsCollector::new();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        for tick in 1..=total_ticks {
            ticker.tick().await;
            if tick == trigger_at {
                if let Err(e) = trigger_scenario(&registry, config.scenario) {
                    log::warn!("Scenario {:?} not triggered: {}", config.scenario, e);
                }
            }
            let record = collector.sample(tick as f64, registry.mode(), &registry.snapshot());
            sink.record(&record);
        }

        registry.set_running(false);
        registry.stop_ambulance_timer();
        log::info!("Simulation stopped after {} ticks", total_ticks);
        // One more period so every controller observes the stop.
        ticker.tick().await;
        for handle in handles {
            handle.abort();
        }

        let summary = collector.summary(registry.mode(), &registry.snapshot(), registry.ambulance_trip());
        match serde_json::to_string(&summary) {
            Ok(line) => log::info!("Run summary: {}", line),
            Err(e) => log::warn!("Failed to serialize run summary: {}", e),
        }
        summary
    }
}

/// Fires a scenario event on the registry.
pub fn trigger_scenario(registry: &Registry, scenario: Scenario) -> Result<()> {
    match scenario {
        Scenario::None => Ok(()),
        Scenario::FailCorner => inject_fault(registry, CORNER_NODE),
        Scenario::FailCenter => inject_fault(registry, CENTER_NODE),
        Scenario::Ambulance => {
            let id: IntersectionId = AMBULANCE_ENTRY_NODE.parse()?;
            if registry.intersection(id).is_none() {
                return Err(SimError::UnknownIntersection(id));
            }
            // Started first so an immediate hand-off cannot stop it early.
            registry.start_ambulance_timer();
            registry.spawn_ambulance(id);
            log::info!("Ambulance dispatched at {}", id);
            Ok(())
        }
    }
}

fn inject_fault(registry: &Registry, node: &str) -> Result<()> {
    let id: IntersectionId = node.parse()?;
    if !registry.toggle_sensor_fault(id) {
        return Err(SimError::UnknownIntersection(id));
    }
    log::info!("Sensor fault injected at {}", id);
    Ok(())
}
