use crate::global_variables::{
    FIXED_CYCLE_TICKS, GREEN_WAVE_LOCAL_QUEUE_LIMIT, GREEN_WAVE_THRESHOLD_BOOST,
    GRIDLOCK_LOCAL_QUEUE_LIMIT, MIN_GREEN_TICKS, PHEROMONE_GRIDLOCK_LEVEL,
};
use crate::simulation_engine::registry::ControlMode;

/// What a controller believes about its own node after the physics step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Beliefs {
    pub queue_ns: i32,
    pub queue_ew: i32,
    pub green_ns: bool,
    pub in_transition: bool,
    pub sensors_broken: bool,
    pub ambulance_approaching: bool,
    /// Pheromone level of the east neighbour.
    pub max_neighbor_pheromone: f64,
    /// Set by an inbound green-wave notification, consumed by planning.
    pub green_wave_incoming: bool,
}

impl Beliefs {
    pub fn max_queue(&self) -> i32 {
        self.queue_ns.max(self.queue_ew)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desire {
    PassEmergency,
    FixedCycle,
    FailSafe,
    PreventGridlock,
    PrepareGreenWave,
    ManageLocalTraffic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intention {
    SwitchPhase,
    KeepCurrentPhase,
}

/// Minimum-green guard and fixed-cycle timer. Both are armed by every switch;
/// the fixed-cycle timer also paces the fail-safe policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimers {
    pub min_green: u32,
    pub fixed_cycle: u32,
}

impl PhaseTimers {
    pub fn countdown(&mut self) {
        self.min_green = self.min_green.saturating_sub(1);
        self.fixed_cycle = self.fixed_cycle.saturating_sub(1);
    }

    pub fn arm(&mut self) {
        self.min_green = MIN_GREEN_TICKS;
        self.fixed_cycle = FIXED_CYCLE_TICKS;
    }
}

/// First matching desire wins.
pub fn deliberate(beliefs: &Beliefs, mode: ControlMode) -> Desire {
    if beliefs.ambulance_approaching {
        return Desire::PassEmergency;
    }
    if mode == ControlMode::FixedCycle {
        return Desire::FixedCycle;
    }
    if beliefs.sensors_broken {
        return Desire::FailSafe;
    }

    let max_queue = beliefs.max_queue();
    if mode == ControlMode::Stigmergy
        && beliefs.max_neighbor_pheromone > PHEROMONE_GRIDLOCK_LEVEL
        && max_queue < GRIDLOCK_LOCAL_QUEUE_LIMIT
    {
        return Desire::PreventGridlock;
    }
    if mode == ControlMode::GreenWave
        && beliefs.green_wave_incoming
        && max_queue < GREEN_WAVE_LOCAL_QUEUE_LIMIT
    {
        return Desire::PrepareGreenWave;
    }
    Desire::ManageLocalTraffic
}

/// Turns a desire into an intention. Consumes the green-wave signal and may
/// inflate `threshold`.
pub fn plan(
    desire: Desire,
    beliefs: &mut Beliefs,
    timers: &PhaseTimers,
    threshold: &mut i32,
) -> Intention {
    use Intention::{KeepCurrentPhase, SwitchPhase};

    match desire {
        // The ambulance always travels N->S.
        Desire::PassEmergency => {
            return if beliefs.green_ns {
                KeepCurrentPhase
            } else {
                SwitchPhase
            };
        }
        Desire::FixedCycle | Desire::FailSafe => {
            return if timers.fixed_cycle == 0 {
                SwitchPhase
            } else {
                KeepCurrentPhase
            };
        }
        _ => {}
    }

    if beliefs.in_transition || timers.min_green > 0 {
        return KeepCurrentPhase;
    }

    match desire {
        // Only ever clears the EW-green case.
        Desire::PreventGridlock => {
            if beliefs.green_ns {
                KeepCurrentPhase
            } else {
                SwitchPhase
            }
        }
        Desire::PrepareGreenWave => {
            beliefs.green_wave_incoming = false;
            if beliefs.green_ns {
                SwitchPhase
            } else {
                // Stay EW-green and make a later switch harder.
                *threshold += GREEN_WAVE_THRESHOLD_BOOST;
                KeepCurrentPhase
            }
        }
        _ => manage_local_traffic(beliefs, *threshold),
    }
}

fn manage_local_traffic(beliefs: &Beliefs, threshold: i32) -> Intention {
    let (green_queue, red_queue) = if beliefs.green_ns {
        (beliefs.queue_ns, beliefs.queue_ew)
    } else {
        (beliefs.queue_ew, beliefs.queue_ns)
    };
    if red_queue > threshold || (green_queue == 0 && red_queue > 0) {
        Intention::SwitchPhase
    } else {
        Intention::KeepCurrentPhase
    }
}
