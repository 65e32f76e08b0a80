use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::global_variables::{
    AMBULANCE_CLEAR_BELOW, AMBULANCE_DRAIN_PER_TICK, DEFAULT_THRESHOLD, MAX_INFLOW_BATCH,
    PHEROMONE_DECAY, PHEROMONE_HEAVY_QUEUE, PHEROMONE_MAX, PHEROMONE_MEDIUM_QUEUE, ROAD_CAPACITY,
    SENSOR_UNKNOWN, YELLOW_CO2_FACTOR, YELLOW_TICKS,
};

/// A unique identifier for an intersection, using (row, col) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntersectionId(pub i8, pub i8);

impl IntersectionId {
    pub fn row(&self) -> i8 {
        self.0
    }

    pub fn col(&self) -> i8 {
        self.1
    }

    /// `None` past the last representable row.
    pub fn south(&self) -> Option<IntersectionId> {
        self.0.checked_add(1).map(|row| IntersectionId(row, self.1))
    }

    /// `None` past the last representable column.
    pub fn east(&self) -> Option<IntersectionId> {
        self.1.checked_add(1).map(|col| IntersectionId(self.0, col))
    }
}

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Node_{}_{}", self.0, self.1)
    }
}

impl FromStr for IntersectionId {
    type Err = SimError;

    /// Parses names of the form `Node_<row>_<col>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SimError::MalformedNodeId(s.to_string());
        let mut parts = s.split('_');
        if parts.next() != Some("Node") {
            return Err(malformed());
        }
        let row = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
        let col = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(IntersectionId(row, col))
    }
}

/// Approach direction of a queue. Streets are one-way N->S and W->E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    NorthSouth,
    EastWest,
}

/// Cumulative per-node metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntersectionMetrics {
    pub cars_passed: u64,
    pub queue_area_sum: u64,
    pub tick_count: u64,
    pub wait_time_sum: u64,
    pub co2_sum: f64,
}

/// Physical state of one signalised intersection.
#[derive(Debug, Clone)]
pub struct IntersectionState {
    pub id: IntersectionId,
    /// Display coordinates handed over at setup.
    pub coordinates: (i32, i32),
    queue_ns: u32,
    queue_ew: u32,
    green_ns: bool,
    transition_ticks: u32,
    pheromone: f64,
    adaptive_threshold: i32,
    sensors_ok: bool,
    ambulance: bool,
    reset_requested: bool,
    metrics: IntersectionMetrics,
}

/// Registry handle to an intersection. Owner ticks and neighbour admissions
/// serialise on the mutex.
pub type SharedIntersection = Arc<Mutex<IntersectionState>>;

/// Locks a shared intersection. Node state is plain data, so a poisoned lock
/// is still usable.
pub fn lock_state(node: &SharedIntersection) -> MutexGuard<'_, IntersectionState> {
    node.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IntersectionState {
    pub fn new(id: IntersectionId, coordinates: (i32, i32)) -> Self {
        Self {
            id,
            coordinates,
            queue_ns: 0,
            queue_ew: 0,
            green_ns: true,
            transition_ticks: 0,
            pheromone: 0.0,
            adaptive_threshold: DEFAULT_THRESHOLD,
            sensors_ok: true,
            ambulance: false,
            reset_requested: false,
            metrics: IntersectionMetrics::default(),
        }
    }

    pub fn into_shared(self) -> SharedIntersection {
        Arc::new(Mutex::new(self))
    }

    /// Enqueues `amount` cars unless the road would exceed its capacity.
    /// A refused admission leaves the node untouched.
    pub fn admit(&mut self, direction: Direction, amount: u32) -> bool {
        let queue = match direction {
            Direction::NorthSouth => &mut self.queue_ns,
            Direction::EastWest => &mut self.queue_ew,
        };
        if queue.checked_add(amount).map_or(true, |q| q > ROAD_CAPACITY) {
            return false;
        }
        *queue += amount;
        self.metrics.queue_area_sum += amount as u64;
        self.metrics.tick_count += 1;
        true
    }

    /// Puts back cars that were dequeued this tick but refused downstream.
    pub fn restore(&mut self, direction: Direction, amount: u32) {
        match direction {
            Direction::NorthSouth => self.queue_ns = self.queue_ns.saturating_add(amount),
            Direction::EastWest => self.queue_ew = self.queue_ew.saturating_add(amount),
        }
    }

    /// Generates arrivals at a boundary node. `highway_prob` and
    /// `side_street_prob` are percentages for the NS and EW approaches.
    pub fn generate_inflow<R: Rng>(
        &mut self,
        rng: &mut R,
        highway_prob: u8,
        side_street_prob: u8,
    ) {
        if rng.random_range(0..100u32) < highway_prob as u32 {
            self.queue_ns += rng.random_range(1..=MAX_INFLOW_BATCH);
        }
        if rng.random_range(0..100u32) < side_street_prob as u32 {
            self.queue_ew += rng.random_range(1..=MAX_INFLOW_BATCH);
        }

        let queued = self.total_queue() as u64;
        self.metrics.queue_area_sum += queued;
        self.metrics.tick_count += 1;
        self.metrics.wait_time_sum += queued;
        self.metrics.co2_sum += queued as f64;
    }

    /// Advances the signal one tick and returns the number of cars that left.
    pub fn step(&mut self) -> u32 {
        if self.transition_ticks > 0 {
            self.transition_ticks -= 1;
            return 0;
        }

        let moved = if self.green_ns {
            // Other traffic pulls over while an ambulance is present.
            let capacity = if self.ambulance {
                AMBULANCE_DRAIN_PER_TICK
            } else {
                1
            };
            let moved = capacity.min(self.queue_ns);
            self.queue_ns -= moved;
            if self.ambulance && self.queue_ns < AMBULANCE_CLEAR_BELOW {
                self.ambulance = false;
            }
            moved
        } else {
            let moved = 1.min(self.queue_ew);
            self.queue_ew -= moved;
            moved
        };

        self.metrics.cars_passed += moved as u64;
        moved
    }

    /// Flips right-of-way. With the yellow penalty enabled the node enters a
    /// no-flow transition and pays an acceleration CO2 cost for every queued car.
    pub fn switch_phase(&mut self, yellow_penalty: bool) {
        self.green_ns = !self.green_ns;
        if yellow_penalty {
            self.transition_ticks = YELLOW_TICKS;
            self.metrics.co2_sum += self.total_queue() as f64 * YELLOW_CO2_FACTOR;
        }
    }

    pub fn update_pheromone(&mut self) {
        if self.pheromone > 0.0 {
            self.pheromone -= PHEROMONE_DECAY;
        }
        let total = self.total_queue();
        if total > PHEROMONE_HEAVY_QUEUE {
            self.pheromone += 2.0;
        } else if total > PHEROMONE_MEDIUM_QUEUE {
            self.pheromone += 1.0;
        }
        self.pheromone = self.pheromone.clamp(0.0, PHEROMONE_MAX);
    }

    pub fn toggle_sensors(&mut self) {
        self.sensors_ok = !self.sensors_ok;
    }

    /// Flags an ambulance on the NS approach. The ambulance itself joins the
    /// queue regardless of capacity.
    pub fn add_ambulance(&mut self) {
        self.ambulance = true;
        self.queue_ns = self.queue_ns.saturating_add(1);
    }

    /// Zeroes the node and raises the reset flag for its owner.
    pub fn reset(&mut self) {
        *self = Self {
            reset_requested: true,
            ..Self::new(self.id, self.coordinates)
        };
    }

    /// Returns true once per reset.
    pub fn check_and_clear_reset(&mut self) -> bool {
        std::mem::take(&mut self.reset_requested)
    }

    // Sensor readings

    pub fn queue_ns(&self) -> i32 {
        if self.sensors_ok {
            self.queue_ns as i32
        } else {
            SENSOR_UNKNOWN
        }
    }

    pub fn queue_ew(&self) -> i32 {
        if self.sensors_ok {
            self.queue_ew as i32
        } else {
            SENSOR_UNKNOWN
        }
    }

    /// A faulted node cannot claim an emergency override.
    pub fn has_ambulance(&self) -> bool {
        self.sensors_ok && self.ambulance
    }

    pub fn sensors_ok(&self) -> bool {
        self.sensors_ok
    }

    // Ground truth, for telemetry and conservation checks.

    pub fn real_queue_ns(&self) -> u32 {
        self.queue_ns
    }

    pub fn real_queue_ew(&self) -> u32 {
        self.queue_ew
    }

    pub fn total_queue(&self) -> u32 {
        self.queue_ns + self.queue_ew
    }

    pub fn is_ns_green(&self) -> bool {
        self.green_ns
    }

    pub fn is_in_transition(&self) -> bool {
        self.transition_ticks > 0
    }

    pub fn transition_ticks(&self) -> u32 {
        self.transition_ticks
    }

    pub fn pheromone(&self) -> f64 {
        self.pheromone
    }

    pub fn adaptive_threshold(&self) -> i32 {
        self.adaptive_threshold
    }

    pub fn set_adaptive_threshold(&mut self, threshold: i32) {
        self.adaptive_threshold = threshold;
    }

    pub fn metrics(&self) -> &IntersectionMetrics {
        &self.metrics
    }

    pub fn average_queue(&self) -> f64 {
        if self.metrics.tick_count == 0 {
            0.0
        } else {
            self.metrics.queue_area_sum as f64 / self.metrics.tick_count as f64
        }
    }

    pub fn average_wait(&self) -> f64 {
        if self.metrics.cars_passed == 0 {
            0.0
        } else {
            self.metrics.wait_time_sum as f64 / self.metrics.cars_passed as f64
        }
    }

    #[cfg(test)]
    pub(crate) fn with_queues(mut self, queue_ns: u32, queue_ew: u32) -> Self {
        self.queue_ns = queue_ns;
        self.queue_ew = queue_ew;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_green_ns(mut self, green_ns: bool) -> Self {
        self.green_ns = green_ns;
        self
    }
}
