use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use std::thread;
use std::time::Duration;

/// Delay provider backed by `thread::sleep`.
///
/// Used when the chip on the other end runs in real time, such as a model
/// server driven over the hardware-in-the-loop link.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayUs<u32> for StdDelay {
    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }
}

impl DelayMs<u32> for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
