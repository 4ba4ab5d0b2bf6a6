//! Exponential-backoff delay scheduling with a bounded attempt budget.
//!
//! Retry loops (ARP probing, connection establishment) ask this state
//! machine how long to wait before the next attempt and whether another
//! attempt is still allowed.

/// Default minimum delay between attempts, in ticks.
pub const ADAPTIVE_DELAY_MIN_TICKS: u32 = 10;
/// Default maximum delay, in ticks.
pub const ADAPTIVE_DELAY_MAX_TICKS: u32 = 1000;
/// Default multiplier applied to the delay after each attempt.
pub const ADAPTIVE_DELAY_BACKOFF_FACTOR: u32 = 2;
/// Default attempt budget.
pub const ADAPTIVE_DELAY_MAX_ATTEMPTS: u32 = 10;

/// Exponential-backoff delay state.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveDelay {
    current_delay: u32,
    attempts: u32,
    min_delay: u32,
    max_delay: u32,
    backoff_factor: u32,
    max_attempts: u32,
    active: bool,
}

impl AdaptiveDelay {
    /// State with the default tuning.
    pub const fn new() -> Self {
        Self::with_params(
            ADAPTIVE_DELAY_MIN_TICKS,
            ADAPTIVE_DELAY_MAX_TICKS,
            ADAPTIVE_DELAY_BACKOFF_FACTOR,
            ADAPTIVE_DELAY_MAX_ATTEMPTS,
        )
    }

    pub const fn with_params(min: u32, max: u32, factor: u32, max_attempts: u32) -> Self {
        Self {
            current_delay: 0,
            attempts: 0,
            min_delay: min,
            max_delay: max,
            backoff_factor: factor,
            max_attempts,
            active: false,
        }
    }

    /// Next delay to wait, in ticks: `min` on the first call, then
    /// `min(current * factor, max)`. Each call counts one attempt.
    pub fn get_next_delay(&mut self) -> u32 {
        if !self.active {
            self.active = true;
            self.current_delay = self.min_delay;
        } else {
            self.current_delay = self
                .current_delay
                .saturating_mul(self.backoff_factor)
                .min(self.max_delay);
        }
        self.attempts += 1;
        self.current_delay
    }

    /// `true` while the attempt budget is not exhausted.
    #[inline]
    pub fn should_continue(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// The operation succeeded; forget the backoff history.
    pub fn on_success(&mut self) {
        self.reset();
    }

    /// The operation failed. Observer only; the next `get_next_delay`
    /// already grows the delay.
    pub fn on_failure(&mut self) {}

    pub fn reset(&mut self) {
        self.current_delay = 0;
        self.attempts = 0;
        self.active = false;
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for AdaptiveDelay {
    fn default() -> Self {
        Self::new()
    }
}
