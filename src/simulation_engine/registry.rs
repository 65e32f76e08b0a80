use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::communication::messages::{CoordinationMessage, Inbox, Mailbox};
use crate::error::SimError;
use crate::shared_data::NodeTelemetry;
use crate::simulation_engine::intersections::{
    lock_state, Direction, IntersectionId, IntersectionState, SharedIntersection,
};

/// The five strategies under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    #[serde(rename = "BASELINE_FIXED")]
    FixedCycle,
    #[serde(rename = "LEARNING_ONLY")]
    LocallyAdaptive,
    #[serde(rename = "COORD_GREEN_WAVE")]
    GreenWave,
    #[serde(rename = "COORD_STIGMERGY")]
    Stigmergy,
    #[serde(rename = "SMART")]
    ReinforcementLearning,
}

impl ControlMode {
    pub const ALL: [ControlMode; 5] = [
        ControlMode::FixedCycle,
        ControlMode::LocallyAdaptive,
        ControlMode::GreenWave,
        ControlMode::Stigmergy,
        ControlMode::ReinforcementLearning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::FixedCycle => "BASELINE_FIXED",
            ControlMode::LocallyAdaptive => "LEARNING_ONLY",
            ControlMode::GreenWave => "COORD_GREEN_WAVE",
            ControlMode::Stigmergy => "COORD_STIGMERGY",
            ControlMode::ReinforcementLearning => "SMART",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| SimError::InvalidConfig(format!("unknown mode {s}")))
    }
}

/// Arrival probabilities (percent per tick) at boundary nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficParams {
    pub highway_prob: u8,
    pub side_street_prob: u8,
}

impl Default for TrafficParams {
    fn default() -> Self {
        Self {
            highway_prob: 50,
            side_street_prob: 15,
        }
    }
}

/// Result of pushing cars into another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// The receiving road is full; the sender keeps its cars.
    Refused,
    /// No such node: the cars leave the grid.
    Exited,
}

#[derive(Debug, Default)]
struct AmbulanceTimer {
    started: Option<Instant>,
    last_trip: Option<Duration>,
}

/// Shared world state for one simulation instance.
pub struct Registry {
    intersections: RwLock<HashMap<IntersectionId, SharedIntersection>>,
    mailboxes: RwLock<HashMap<IntersectionId, Mailbox>>,
    mode: RwLock<ControlMode>,
    traffic: RwLock<TrafficParams>,
    running: AtomicBool,
    yellow_penalty: AtomicBool,
    ambulance_timer: Mutex<AmbulanceTimer>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            intersections: RwLock::new(HashMap::new()),
            mailboxes: RwLock::new(HashMap::new()),
            mode: RwLock::new(ControlMode::FixedCycle),
            traffic: RwLock::new(TrafficParams::default()),
            running: AtomicBool::new(false),
            yellow_penalty: AtomicBool::new(true),
            ambulance_timer: Mutex::new(AmbulanceTimer::default()),
        }
    }

    /// Adds a node and opens its mailbox. Re-registering an id replaces the
    /// previous node.
    pub fn register(&self, state: IntersectionState) -> (SharedIntersection, Inbox) {
        let id = state.id;
        let shared = state.into_shared();
        let (tx, rx) = mpsc::unbounded_channel();
        self.intersections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, shared.clone());
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        (shared, rx)
    }

    pub fn intersection(&self, id: IntersectionId) -> Option<SharedIntersection> {
        self.intersections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<IntersectionId> {
        let mut ids: Vec<_> = self
            .intersections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.intersections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_node<T>(&self, id: IntersectionId, f: impl FnOnce(&mut IntersectionState) -> T) -> Option<T> {
        let node = self.intersection(id)?;
        let mut state = lock_state(&node);
        Some(f(&mut state))
    }

    /// The only write path from one controller into another node.
    pub fn admit(&self, target: IntersectionId, direction: Direction, amount: u32) -> Admission {
        match self.with_node(target, |state| state.admit(direction, amount)) {
            Some(true) => Admission::Accepted,
            Some(false) => Admission::Refused,
            None => Admission::Exited,
        }
    }

    /// Fire-and-forget delivery. Unknown or closed mailboxes drop the message.
    pub fn notify(&self, target: IntersectionId, message: CoordinationMessage) {
        let mailboxes = self.mailboxes.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(mailbox) = mailboxes.get(&target) {
            let _ = mailbox.send(message);
        }
    }

    // Control surface

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn mode(&self) -> ControlMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_mode(&self, mode: ControlMode) {
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn yellow_penalty(&self) -> bool {
        self.yellow_penalty.load(Ordering::SeqCst)
    }

    pub fn set_yellow_penalty(&self, enabled: bool) {
        self.yellow_penalty.store(enabled, Ordering::SeqCst);
    }

    pub fn traffic_params(&self) -> TrafficParams {
        *self.traffic.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Percentages above 100 are clamped.
    pub fn set_traffic_params(&self, highway_prob: u8, side_street_prob: u8) {
        *self.traffic.write().unwrap_or_else(PoisonError::into_inner) = TrafficParams {
            highway_prob: highway_prob.min(100),
            side_street_prob: side_street_prob.min(100),
        };
    }

    /// Zeroes every node and the ambulance stopwatch. Controllers notice the
    /// reset on their next tick.
    pub fn reset_all(&self) {
        let nodes: Vec<_> = self
            .intersections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for node in nodes {
            lock_state(&node).reset();
        }
        *self.ambulance_timer.lock().unwrap_or_else(PoisonError::into_inner) =
            AmbulanceTimer::default();
        log::info!("Registry reset ({} intersections)", self.len());
    }

    /// Returns false for an unknown id.
    pub fn toggle_sensor_fault(&self, id: IntersectionId) -> bool {
        self.with_node(id, |state| state.toggle_sensors()).is_some()
    }

    pub fn spawn_ambulance(&self, id: IntersectionId) -> bool {
        self.with_node(id, |state| state.add_ambulance()).is_some()
    }

    pub fn start_ambulance_timer(&self) {
        let mut timer = self.ambulance_timer.lock().unwrap_or_else(PoisonError::into_inner);
        timer.started = Some(Instant::now());
        timer.last_trip = None;
    }

    /// Stops a running stopwatch; a stopped one is left as is.
    pub fn stop_ambulance_timer(&self) {
        let mut timer = self.ambulance_timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(started) = timer.started.take() {
            timer.last_trip = Some(started.elapsed());
        }
    }

    /// Elapsed trip time while running, else the last completed trip.
    pub fn ambulance_trip(&self) -> Option<Duration> {
        let timer = self.ambulance_timer.lock().unwrap_or_else(PoisonError::into_inner);
        timer.started.map(|s| s.elapsed()).or(timer.last_trip)
    }

    pub fn ambulance_timer_running(&self) -> bool {
        self.ambulance_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
            .is_some()
    }

    // Telemetry

    pub fn telemetry(&self, id: IntersectionId) -> Option<NodeTelemetry> {
        self.with_node(id, |state| NodeTelemetry::from_state(state))
    }

    /// Telemetry for every node, ordered by id.
    pub fn snapshot(&self) -> Vec<NodeTelemetry> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.telemetry(id))
            .collect()
    }
}
