// simulation_main.rs
use signal_grid::monitoring::LogSink;
use signal_grid::{Simulation, SimulationConfig};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => SimulationConfig::load(&path),
        None => SimulationConfig::default().validate(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let simulation = match Simulation::bootstrap(&config) {
        Ok(simulation) => simulation,
        Err(e) => {
            eprintln!("Error building the grid: {}", e);
            process::exit(1);
        }
    };

    let summary = simulation.run_experiment(&config, &mut LogSink).await;
    println!(
        "{}: {} cars passed, avg wait {:.2}, avg queue {:.2}, CO2/car {:.3}",
        summary.mode,
        summary.throughput,
        summary.session_average_wait,
        summary.global_average_queue,
        summary.co2_per_car
    );
    if let Some(trip) = summary.ambulance_trip_secs {
        println!("Ambulance trip: {:.2}s", trip);
    }
}
