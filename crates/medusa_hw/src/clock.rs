use embedded_hal::blocking::delay::{DelayMs, DelayUs};

/// Delay provider for simulated runs.
///
/// Never sleeps; it only accumulates the time the caller asked to wait, so
/// a batch against the model finishes at simulation speed while still
/// reporting how long the bench would have spent waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimDelay {
    elapsed_us: u64,
}

impl SimDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total waiting time requested so far.
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }
}

impl DelayUs<u32> for SimDelay {
    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += us as u64;
    }
}

impl DelayMs<u32> for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_us += ms as u64 * 1000;
    }
}
