//! Two-threshold hysteresis tracker.
//!
//! A debounced edge detector: the state only flips high once the value
//! reaches the high threshold, and only flips back low once it drops below
//! the low threshold. Consumers drain edges through the pending flag, so a
//! burst of updates inside one band produces at most one event.

/// Debounced two-threshold state tracker.
#[derive(Clone, Copy, Debug)]
pub struct Hysteresis {
    low_threshold: u32,
    high_threshold: u32,
    current_value: u32,
    state_high: bool,
    transition_pending: bool,
}

impl Hysteresis {
    /// Build a tracker. Requires `low < high`.
    pub fn new(low_threshold: u32, high_threshold: u32, initial_value: u32) -> Self {
        debug_assert!(low_threshold < high_threshold);
        Self {
            low_threshold,
            high_threshold,
            current_value: initial_value,
            state_high: initial_value >= high_threshold,
            transition_pending: false,
        }
    }

    /// Feed a new value. Returns `true` if the state flipped.
    pub fn update(&mut self, new_value: u32) -> bool {
        self.current_value = new_value;
        if !self.state_high && new_value >= self.high_threshold {
            self.state_high = true;
            self.transition_pending = true;
            return true;
        }
        if self.state_high && new_value < self.low_threshold {
            self.state_high = false;
            self.transition_pending = true;
            return true;
        }
        false
    }

    #[inline]
    pub fn is_high(&self) -> bool {
        self.state_high
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.current_value
    }

    #[inline]
    pub fn is_transition_pending(&self) -> bool {
        self.transition_pending
    }

    #[inline]
    pub fn clear_transition(&mut self) {
        self.transition_pending = false;
    }

    /// Re-seed the tracker at a new value, dropping any pending edge.
    pub fn reset(&mut self, new_value: u32) {
        self.current_value = new_value;
        self.state_high = new_value >= self.high_threshold;
        self.transition_pending = false;
    }
}
