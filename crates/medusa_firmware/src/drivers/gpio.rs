//! GPIO bank driver.
//!
//! Every pin is a zero-sized handle over one bit of the shared bank
//! registers. Output updates are read-modify-write sequences on a single
//! hart with interrupts left disabled, so no locking is needed.

use core::convert::Infallible;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use medusa_common::mmio::{GPIO_BASE, GPIO_INPUT_VAL, GPIO_OUTPUT_EN, GPIO_OUTPUT_VAL};

#[inline(always)]
fn reg(offset: usize) -> *mut u32 {
    (GPIO_BASE + offset) as *mut u32
}

fn modify(offset: usize, mask: u32, set: bool) {
    unsafe {
        let value = reg(offset).read_volatile();
        let value = if set { value | mask } else { value & !mask };
        reg(offset).write_volatile(value);
    }
}

/// Pin driven by the controller.
pub struct Output {
    mask: u32,
}

impl Output {
    /// Enables the output driver of `pin`, starting low.
    pub fn new(pin: u32) -> Self {
        let mask = 1 << pin;
        modify(GPIO_OUTPUT_VAL, mask, false);
        modify(GPIO_OUTPUT_EN, mask, true);
        Self { mask }
    }
}

impl OutputPin for Output {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        modify(GPIO_OUTPUT_VAL, self.mask, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        modify(GPIO_OUTPUT_VAL, self.mask, true);
        Ok(())
    }
}

/// Pin sampled by the controller.
pub struct Input {
    mask: u32,
}

impl Input {
    /// Disables the output driver of `pin`.
    pub fn new(pin: u32) -> Self {
        let mask = 1 << pin;
        modify(GPIO_OUTPUT_EN, mask, false);
        Self { mask }
    }
}

impl InputPin for Input {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(unsafe { reg(GPIO_INPUT_VAL).read_volatile() } & self.mask != 0)
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}
