use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::communication::messages::{CoordinationMessage, Inbox};
use crate::control_system::deliberation::{deliberate, plan, Beliefs, Desire, Intention, PhaseTimers};
use crate::control_system::threshold_learner::ThresholdLearner;
use crate::error::{Result, SimError};
use crate::global_variables::{DEFAULT_THRESHOLD, INTERIOR_EW_INFLOW_PROB, RL_SWITCH_GUARD_QUEUE};
use crate::learning::q_learning::{QLearningPolicy, RlAction};
use crate::learning::state_encoder::{calculate_reward, encode_state, StateId};
use crate::simulation_engine::grid::NodeSetup;
use crate::simulation_engine::intersections::{
    lock_state, Direction, IntersectionId, IntersectionState, SharedIntersection,
};
use crate::simulation_engine::registry::{Admission, ControlMode, Registry};

/// Episodic memory of the RL loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RlMemory {
    pub previous: Option<(StateId, RlAction)>,
    pub hold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The simulation is paused.
    Idle,
    Advanced {
        /// `None` in RL mode.
        desire: Option<Desire>,
        intention: Intention,
        cars_passed: u32,
    },
}

/// Coerces actions the RL policy must not take in the current phase.
pub fn apply_safety_mask(action: RlAction, green_ns: bool, queue_ns: i32) -> RlAction {
    if !green_ns && action == RlAction::HoldLong {
        return RlAction::Switch;
    }
    if green_ns && queue_ns > RL_SWITCH_GUARD_QUEUE && action == RlAction::Switch {
        return RlAction::HoldLong;
    }
    action
}

/// Autonomous controller for one intersection. The registry owns the node;
/// the controller looks it up by id every tick.
pub struct TrafficLightController<R: Rng = SmallRng> {
    id: IntersectionId,
    registry: Arc<Registry>,
    south: Option<IntersectionId>,
    east: Option<IntersectionId>,
    inbox: Inbox,
    beliefs: Beliefs,
    threshold: i32,
    learner: ThresholdLearner,
    timers: PhaseTimers,
    policy: QLearningPolicy<R>,
    rl: RlMemory,
    rng: R,
    was_running: bool,
}

impl TrafficLightController<SmallRng> {
    /// Registers the node and derives both random streams from `seed`.
    pub fn seeded(registry: Arc<Registry>, setup: &NodeSetup, seed: u64) -> Self {
        Self::setup(
            registry,
            setup,
            SmallRng::seed_from_u64(seed),
            QLearningPolicy::seeded(seed.wrapping_add(1)),
        )
    }
}

impl<R: Rng> TrafficLightController<R> {
    /// Creates the node described by `setup` in the registry and takes
    /// ownership of its mailbox.
    pub fn setup(registry: Arc<Registry>, setup: &NodeSetup, rng: R, policy: QLearningPolicy<R>) -> Self {
        let (_, inbox) = registry.register(IntersectionState::new(setup.id, setup.coordinates));
        Self {
            id: setup.id,
            registry,
            south: setup.south,
            east: setup.east,
            inbox,
            beliefs: Beliefs::default(),
            threshold: DEFAULT_THRESHOLD,
            learner: ThresholdLearner::new(),
            timers: PhaseTimers::default(),
            policy,
            rl: RlMemory::default(),
            rng,
            was_running: false,
        }
    }

    pub fn id(&self) -> IntersectionId {
        self.id
    }

    pub fn beliefs(&self) -> &Beliefs {
        &self.beliefs
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub fn timers(&self) -> PhaseTimers {
        self.timers
    }

    pub fn rl_memory(&self) -> RlMemory {
        self.rl
    }

    pub fn policy(&self) -> &QLearningPolicy<R> {
        &self.policy
    }

    /// One control cycle. An `Err` leaves the node untouched.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.drain_inbox();
        let node = self
            .registry
            .intersection(self.id)
            .ok_or(SimError::UnknownIntersection(self.id))?;

        let running = self.registry.is_running();
        let mode = self.registry.mode();
        if self.was_running && !running && mode == ControlMode::ReinforcementLearning {
            self.report_q_table();
        }
        self.was_running = running;

        if lock_state(&node).check_and_clear_reset() {
            self.reset_beliefs(&node);
        }
        if !running {
            return Ok(TickOutcome::Idle);
        }

        self.timers.countdown();
        self.rl.hold = self.rl.hold.saturating_sub(1);

        lock_state(&node).update_pheromone();
        let cars_passed = self.update_beliefs_and_physics(&node);
        if mode == ControlMode::LocallyAdaptive {
            self.adapt_threshold(&node);
        }

        let (desire, intention) = match mode {
            ControlMode::ReinforcementLearning => (None, self.run_rl()),
            _ => {
                let desire = deliberate(&self.beliefs, mode);
                let intention = plan(desire, &mut self.beliefs, &self.timers, &mut self.threshold);
                (Some(desire), intention)
            }
        };
        self.execute(&node, intention);

        Ok(TickOutcome::Advanced {
            desire,
            intention,
            cars_passed,
        })
    }

    /// `tick` with failures contained: an error or a panic is logged and the
    /// tick becomes a no-op. Node locks poisoned by a panic stay usable.
    pub fn tick_or_skip(&mut self) -> Option<TickOutcome> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => {
                log::warn!("{} tick skipped: {}", self.id, e);
                None
            }
            Err(_) => {
                log::error!("{} tick panicked, skipping", self.id);
                None
            }
        }
    }

    /// Drives `tick_or_skip` on a fixed period until the task is aborted.
    pub async fn run(mut self, period: Duration)
    where
        R: Send + 'static,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick_or_skip();
        }
    }

    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                CoordinationMessage::IncomingCars => self.beliefs.green_wave_incoming = true,
            }
        }
    }

    fn update_beliefs_and_physics(&mut self, node: &SharedIntersection) -> u32 {
        let traffic = self.registry.traffic_params();
        let (had_ambulance, cars_passed, has_ambulance, green_ns) = {
            let mut state = lock_state(node);
            if self.id.row() == 0 {
                state.generate_inflow(&mut self.rng, traffic.highway_prob, traffic.side_street_prob);
            } else if self.rng.random_bool(INTERIOR_EW_INFLOW_PROB) {
                state.admit(Direction::EastWest, 1);
            }
            let had_ambulance = state.has_ambulance();
            let cars_passed = state.step();
            (had_ambulance, cars_passed, state.has_ambulance(), state.is_ns_green())
        };

        if had_ambulance && !has_ambulance {
            self.hand_off_ambulance();
        }

        if cars_passed > 0 {
            let (direction, target) = if green_ns {
                (Direction::NorthSouth, self.south)
            } else {
                (Direction::EastWest, self.east)
            };
            if let Some(target) = target {
                self.send_cars(node, target, direction, cars_passed);
            }
        }

        self.beliefs.max_neighbor_pheromone = self
            .east
            .and_then(|east| self.registry.intersection(east))
            .map(|east| lock_state(&east).pheromone())
            .unwrap_or(0.0);

        let state = lock_state(node);
        self.beliefs.queue_ns = state.queue_ns();
        self.beliefs.queue_ew = state.queue_ew();
        self.beliefs.green_ns = state.is_ns_green();
        self.beliefs.in_transition = state.is_in_transition();
        self.beliefs.sensors_broken = !state.sensors_ok();
        self.beliefs.ambulance_approaching = state.has_ambulance();
        cars_passed
    }

    fn send_cars(&self, node: &SharedIntersection, target: IntersectionId, direction: Direction, amount: u32) {
        match self.registry.admit(target, direction, amount) {
            Admission::Accepted => {
                if self.registry.mode() == ControlMode::GreenWave {
                    self.registry.notify(target, CoordinationMessage::IncomingCars);
                }
            }
            Admission::Exited => {}
            // Backpressure: the cars stay here.
            Admission::Refused => lock_state(node).restore(direction, amount),
        }
    }

    fn hand_off_ambulance(&self) {
        match self.south {
            Some(south) if self.registry.spawn_ambulance(south) => {
                log::info!("{}: ambulance handed off to {}", self.id, south);
            }
            _ => {
                self.registry.stop_ambulance_timer();
                log::info!("{}: ambulance left the grid", self.id);
            }
        }
    }

    fn adapt_threshold(&mut self, node: &SharedIntersection) {
        if self.beliefs.sensors_broken {
            return;
        }
        let total = self.beliefs.queue_ns + self.beliefs.queue_ew;
        if let Some(threshold) = self.learner.observe(total, self.threshold) {
            self.threshold = threshold;
            lock_state(node).set_adaptive_threshold(threshold);
        }
    }

    fn run_rl(&mut self) -> Intention {
        let Beliefs {
            queue_ns,
            queue_ew,
            green_ns,
            in_transition,
            ambulance_approaching,
            ..
        } = self.beliefs;

        if ambulance_approaching {
            self.rl.hold = 0;
            return if green_ns {
                Intention::KeepCurrentPhase
            } else {
                Intention::SwitchPhase
            };
        }
        if self.rl.hold > 0 {
            return Intention::KeepCurrentPhase;
        }

        let state = encode_state(queue_ns, queue_ew, green_ns);
        if let Some((prev_state, prev_action)) = self.rl.previous {
            let reward = calculate_reward(queue_ns, queue_ew, prev_action == RlAction::Switch);
            self.policy.update(prev_state, prev_action, reward, state);
        }

        let action = apply_safety_mask(self.policy.choose_action(state), green_ns, queue_ns);
        self.rl.hold = action.hold_ticks();
        self.rl.previous = Some((state, action));

        if in_transition || action != RlAction::Switch {
            Intention::KeepCurrentPhase
        } else {
            Intention::SwitchPhase
        }
    }

    fn execute(&mut self, node: &SharedIntersection, intention: Intention) {
        if intention == Intention::SwitchPhase {
            let mut state = lock_state(node);
            state.switch_phase(self.registry.yellow_penalty());
            self.timers.arm();
            log::debug!(
                "{} switched to {} green",
                self.id,
                if state.is_ns_green() { "NS" } else { "EW" }
            );
        }
    }

    fn reset_beliefs(&mut self, node: &SharedIntersection) {
        self.threshold = DEFAULT_THRESHOLD;
        lock_state(node).set_adaptive_threshold(DEFAULT_THRESHOLD);
        self.timers = PhaseTimers::default();
        self.learner.reset();
        self.beliefs = Beliefs::default();
        self.rl = RlMemory::default();
        log::info!("{} reset.", self.id);
    }

    fn report_q_table(&self) {
        log::info!("Q-table for {}", self.id);
        let report = self.policy.table().report();
        if report.is_empty() {
            log::info!("Q-table is empty");
        }
        for line in report {
            log::info!("{}", line);
        }
    }
}
