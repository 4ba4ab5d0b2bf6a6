//! One-time initialization latch.

use core::sync::atomic::{AtomicBool, Ordering};

/// Latch that lets exactly one caller win the right to initialize.
pub struct InitFlag(AtomicBool);

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns `true` for exactly one caller; everyone after sees `false`.
    #[inline]
    pub fn begin_init(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Test-only: allow re-initialization.
    #[inline]
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}
