// state_encoder.rs
//
// Discretises a node's observation into one of 32 states and scores the
// outcome of the previous action.

use crate::global_variables::{ARTERIAL_PRIORITY_WEIGHT, SWITCH_COST};

/// Discretised observation, always in `0..32`.
pub type StateId = u8;

pub const STATE_COUNT: usize = 32;

/// Queue bucket: 0 empty, 1 light (1-6), 2 medium (7-15), 3 heavy (16+).
/// The fault sentinel falls in the light bucket.
pub fn bucket(queue: i32) -> u8 {
    match queue {
        0 => 0,
        i32::MIN..=6 => 1,
        7..=15 => 2,
        _ => 3,
    }
}

pub fn encode_state(queue_ns: i32, queue_ew: i32, green_ns: bool) -> StateId {
    (bucket(queue_ns) << 3) | (bucket(queue_ew) << 1) | green_ns as u8
}

/// Splits a state back into (NS bucket, EW bucket, NS green).
pub fn decode_state(state: StateId) -> (u8, u8, bool) {
    ((state >> 3) & 0b11, (state >> 1) & 0b11, state & 1 == 1)
}

pub fn bucket_label(bucket: u8) -> &'static str {
    match bucket {
        0 => "Empty",
        1 => "Light",
        2 => "Med",
        _ => "HEAVY",
    }
}

/// Negative total queue, with the NS arterial counted `1 + ARTERIAL_PRIORITY_WEIGHT`
/// times and a flat cost for switching.
pub fn calculate_reward(queue_ns: i32, queue_ew: i32, did_switch: bool) -> f64 {
    let mut reward = -((queue_ns + queue_ew) as f64);
    if queue_ns > 0 {
        reward -= queue_ns as f64 * ARTERIAL_PRIORITY_WEIGHT;
    }
    if did_switch {
        reward -= SWITCH_COST;
    }
    reward
}
