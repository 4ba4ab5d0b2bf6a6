//! Platform services: system timer, sleep, entropy, IRQ line control.
//!
//! Registered by the scheduler/interrupt-controller side of the kernel.

crate::define_service! {
    platform => PlatformServices {
        timer_ticks() -> u64;
        timer_frequency() -> u32;
        timer_sleep_ms(ms: u32);
        irq_mask(irq: u8) -> i32;
        irq_unmask(irq: u8) -> i32;
    }
}

/// Milliseconds since boot, derived from the tick counter.
#[inline(always)]
pub fn get_time_ms() -> u64 {
    let freq = timer_frequency();
    if freq == 0 {
        return 0;
    }
    (timer_ticks() * 1000) / freq as u64
}
