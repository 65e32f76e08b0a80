// Road segment capacity (cars per direction).
pub const ROAD_CAPACITY: u32 = 20;

// Grid topology
pub const GRID_SIZE: i8 = 3;
pub const GRID_ORIGIN_PX: i32 = 150;
pub const GRID_SPACING_PX: i32 = 200;

// Phase timing (ticks)
pub const YELLOW_TICKS: u32 = 2;
pub const MIN_GREEN_TICKS: u32 = 4;
pub const FIXED_CYCLE_TICKS: u32 = 15;
pub const HOLD_SHORT_TICKS: u32 = 5;
pub const HOLD_LONG_TICKS: u32 = 20;

// Physics
pub const AMBULANCE_DRAIN_PER_TICK: u32 = 500;
pub const AMBULANCE_CLEAR_BELOW: u32 = 2;
pub const YELLOW_CO2_FACTOR: f64 = 2.0;
pub const INTERIOR_EW_INFLOW_PROB: f64 = 0.05;
pub const MAX_INFLOW_BATCH: u32 = 3;

// Stigmergy
pub const PHEROMONE_DECAY: f64 = 0.5;
pub const PHEROMONE_MAX: f64 = 10.0;
pub const PHEROMONE_HEAVY_QUEUE: u32 = 15;
pub const PHEROMONE_MEDIUM_QUEUE: u32 = 10;
pub const PHEROMONE_GRIDLOCK_LEVEL: f64 = 8.0;
pub const GRIDLOCK_LOCAL_QUEUE_LIMIT: i32 = 4;

// Green wave
pub const GREEN_WAVE_LOCAL_QUEUE_LIMIT: i32 = 15;
pub const GREEN_WAVE_THRESHOLD_BOOST: i32 = 20;

// Adaptive threshold
pub const DEFAULT_THRESHOLD: i32 = 10;
pub const MIN_THRESHOLD: i32 = 5;
pub const MAX_THRESHOLD: i32 = 20;
pub const LEARNING_WINDOW_TICKS: u32 = 10;

// Q-learning
pub const LEARNING_RATE: f64 = 0.2;
pub const DISCOUNT_FACTOR: f64 = 0.8;
pub const INITIAL_EPSILON: f64 = 0.15;
pub const EPSILON_DECAY: f64 = 0.999;
pub const MIN_EPSILON: f64 = 0.01;
pub const RL_SWITCH_GUARD_QUEUE: i32 = 30;

// Reward shaping. NS is the primary arterial and is weighted on purpose.
pub const ARTERIAL_PRIORITY_WEIGHT: f64 = 2.0;
pub const SWITCH_COST: f64 = 10.0;

// Sensor reading reported while a node's sensors are faulted.
pub const SENSOR_UNKNOWN: i32 = -1;

// Metrics
pub const LIVE_WAIT_WINDOW_SECS: f64 = 5.0;

// Scenario targets
pub const CORNER_NODE: &str = "Node_0_0";
pub const CENTER_NODE: &str = "Node_1_1";
pub const AMBULANCE_ENTRY_NODE: &str = "Node_0_1";
