use crate::global_variables::{LEARNING_WINDOW_TICKS, MAX_THRESHOLD, MIN_THRESHOLD};

/// Windowed queue average driving the adaptive switch threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdLearner {
    queue_sum: i64,
    ticks: u32,
}

impl ThresholdLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one tick of total queue depth. At the end of each window the
    /// adjusted threshold is returned and the window restarts.
    pub fn observe(&mut self, total_queue: i32, threshold: i32) -> Option<i32> {
        self.queue_sum += total_queue as i64;
        self.ticks += 1;
        if self.ticks < LEARNING_WINDOW_TICKS {
            return None;
        }

        let average = self.queue_sum as f64 / LEARNING_WINDOW_TICKS as f64;
        let delta = if average > 12.0 {
            2
        } else if average > 8.0 {
            1
        } else if average < 4.0 {
            -2
        } else {
            -1
        };
        *self = Self::default();
        Some((threshold + delta).clamp(MIN_THRESHOLD, MAX_THRESHOLD))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
