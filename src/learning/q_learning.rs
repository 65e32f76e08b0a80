// q_learning.rs
//
// Tabular Q-learning over the 32 encoded intersection states and three
// signal actions. The table is created lazily and never persisted.

use std::collections::HashMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::global_variables::{
    DISCOUNT_FACTOR, EPSILON_DECAY, HOLD_LONG_TICKS, HOLD_SHORT_TICKS, INITIAL_EPSILON,
    LEARNING_RATE, MIN_EPSILON,
};
use crate::learning::state_encoder::{bucket_label, decode_state, StateId};

pub const ACTION_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RlAction {
    Switch,
    HoldShort,
    HoldLong,
}

impl RlAction {
    pub const ALL: [RlAction; ACTION_COUNT] =
        [RlAction::Switch, RlAction::HoldShort, RlAction::HoldLong];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> RlAction {
        match index {
            0 => RlAction::Switch,
            1 => RlAction::HoldShort,
            _ => RlAction::HoldLong,
        }
    }

    /// Ticks the chosen phase is held before the next decision.
    pub fn hold_ticks(self) -> u32 {
        match self {
            RlAction::Switch => 0,
            RlAction::HoldShort => HOLD_SHORT_TICKS,
            RlAction::HoldLong => HOLD_LONG_TICKS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RlAction::Switch => "SWITCH",
            RlAction::HoldShort => "HOLD_5s",
            RlAction::HoldLong => "HOLD_20s",
        }
    }
}

/// State -> action values. Rows appear on first visit.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    rows: HashMap<StateId, [f64; ACTION_COUNT]>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&mut self, state: StateId) -> &mut [f64; ACTION_COUNT] {
        self.rows.entry(state).or_insert([0.0; ACTION_COUNT])
    }

    pub fn get(&self, state: StateId) -> Option<&[f64; ACTION_COUNT]> {
        self.rows.get(&state)
    }

    pub fn value(&self, state: StateId, action: RlAction) -> f64 {
        self.rows
            .get(&state)
            .map(|row| row[action.index()])
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest-valued action, ties to the lowest index.
    pub fn best_action(&mut self, state: StateId) -> RlAction {
        let row = self.row(state);
        let mut best = 0;
        for i in 1..ACTION_COUNT {
            if row[i] > row[best] {
                best = i;
            }
        }
        RlAction::from_index(best)
    }

    /// One line per visited state, sorted by state id.
    pub fn report(&self) -> Vec<String> {
        let mut states: Vec<_> = self.rows.keys().copied().collect();
        states.sort_unstable();
        states
            .into_iter()
            .map(|state| {
                let values = self.rows[&state];
                let (ns, ew, green_ns) = decode_state(state);
                let mut best = 0;
                for i in 1..ACTION_COUNT {
                    if values[i] > values[best] {
                        best = i;
                    }
                }
                format!(
                    "State [NS:{:<6} | EW:{:<6} | {:<8}] -> Switch: {:6.1} | HoldShort: {:6.1} | HoldLong: {:6.1}  >>> BEST: {}",
                    bucket_label(ns),
                    bucket_label(ew),
                    if green_ns { "GREEN_NS" } else { "GREEN_EW" },
                    values[0],
                    values[1],
                    values[2],
                    RlAction::from_index(best).label()
                )
            })
            .collect()
    }
}

/// Epsilon-greedy Q-learner with an injected random source.
#[derive(Debug, Clone)]
pub struct QLearningPolicy<R: Rng = SmallRng> {
    table: QTable,
    epsilon: f64,
    rng: R,
}

impl QLearningPolicy<SmallRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }
}

impl<R: Rng> QLearningPolicy<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            table: QTable::new(),
            epsilon: INITIAL_EPSILON,
            rng,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    /// Decays epsilon, then explores uniformly with probability epsilon or
    /// exploits the greedy action.
    pub fn choose_action(&mut self, state: StateId) -> RlAction {
        self.epsilon = (self.epsilon * EPSILON_DECAY).max(MIN_EPSILON);
        self.table.row(state);
        if self.rng.random::<f64>() < self.epsilon {
            return RlAction::from_index(self.rng.random_range(0..ACTION_COUNT));
        }
        self.table.best_action(state)
    }

    /// Bellman update against the successor row as it was before this update.
    pub fn update(&mut self, prev_state: StateId, prev_action: RlAction, reward: f64, next_state: StateId) {
        let max_next = self
            .table
            .row(next_state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let q = &mut self.table.row(prev_state)[prev_action.index()];
        *q += LEARNING_RATE * (reward + DISCOUNT_FACTOR * max_next - *q);
    }
}
