//! Busy-wait delays on the machine timer.

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use medusa_common::mmio::{MTIME_ADDR, MTIME_HZ};

/// Current machine timer value.
#[inline(always)]
pub fn ticks() -> u64 {
    unsafe { (MTIME_ADDR as *const u64).read_volatile() }
}

/// Delay provider spinning on `mtime`.
///
/// Holds no state, so every component that needs delays gets its own copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtimeDelay;

impl MtimeDelay {
    fn spin(ticks_to_wait: u64) {
        let start = ticks();
        while ticks().wrapping_sub(start) < ticks_to_wait {
            core::hint::spin_loop();
        }
    }
}

impl DelayUs<u32> for MtimeDelay {
    fn delay_us(&mut self, us: u32) {
        Self::spin((us as u64 * MTIME_HZ).div_ceil(1_000_000));
    }
}

impl DelayMs<u32> for MtimeDelay {
    fn delay_ms(&mut self, ms: u32) {
        Self::spin(ms as u64 * (MTIME_HZ / 1_000));
    }
}
