//! CPU interrupt-flag control.
//!
//! Thin wrappers over the `x86_64` crate used by [`IrqMutex`](crate::IrqMutex)
//! and the bounded hardware spin loops. Saving and restoring RFLAGS (rather
//! than a blind sti) keeps nested critical sections correct.

use x86_64::instructions::interrupts;
use x86_64::registers::rflags::{self, RFlags};

/// Save RFLAGS and disable interrupts. Returns the saved flags for
/// [`restore_flags`].
#[inline]
pub fn save_flags_cli() -> u64 {
    let flags = rflags::read_raw();
    interrupts::disable();
    flags
}

/// Restore the interrupt flag from a value saved by [`save_flags_cli`].
///
/// Only re-enables interrupts if they were enabled at save time.
#[inline]
pub fn restore_flags(saved: u64) {
    if RFlags::from_bits_truncate(saved).contains(RFlags::INTERRUPT_FLAG) {
        interrupts::enable();
    }
}
