//! Bit-banged serial link to the companion embedded core.
//!
//! The embedded core's SPI slave is wired to plain GPIO lines, so every bit
//! is clocked in software. One parameterized transfer routine covers all
//! four clock polarity/phase combinations; which one a given board needs is
//! found empirically with the bridge's mode sweep.

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use log::trace;

/// Settle time for every half bit.
///
/// Shorter delays produce silently corrupted reads over the board wiring.
pub const HALF_BIT_US: u32 = 20;

/// Chip-select setup and hold time around a frame.
pub const FRAME_US: u32 = 50;

/// Clock polarity and phase of the bit-banged link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTiming {
    /// Clock rests high between bits (CPOL = 1).
    pub clock_idle_high: bool,
    /// Data is sampled on the first clock edge of each bit (CPHA = 0).
    pub sample_on_first_edge: bool,
}

impl BusTiming {
    /// Builds the timing for SPI mode 0 to 3.
    ///
    /// # Returns
    ///
    /// `None` for a mode number above 3.
    pub const fn from_mode(mode: u8) -> Option<Self> {
        if mode > 3 {
            return None;
        }
        Some(Self {
            clock_idle_high: mode & 0b10 != 0,
            sample_on_first_edge: mode & 0b01 == 0,
        })
    }

    /// SPI mode number of this timing.
    pub const fn mode(&self) -> u8 {
        let cpol = self.clock_idle_high as u8;
        let cpha = !self.sample_on_first_edge as u8;
        (cpol << 1) | cpha
    }
}

impl Default for BusTiming {
    fn default() -> Self {
        Self {
            clock_idle_high: false,
            sample_on_first_edge: true,
        }
    }
}

/// Byte-level access to the embedded core's serial slave.
///
/// `BitBangSpi` implements this over GPIO pins; the behavioral model of the
/// embedded core implements it directly.
pub trait CoreLink {
    /// Asserts chip select, starting a frame.
    fn select(&mut self);

    /// Deasserts chip select, ending a frame.
    fn deselect(&mut self);

    /// Shifts one byte out while shifting one byte in, MSB first.
    fn exchange(&mut self, byte: u8) -> u8;

    /// Current clock polarity and phase.
    fn timing(&self) -> BusTiming;

    /// Changes clock polarity and phase and parks the clock at its new idle
    /// level.
    fn set_timing(&mut self, timing: BusTiming);
}

/// Software SPI master over four GPIO lines.
pub struct BitBangSpi<CS, SCK, MOSI, MISO, DELAY> {
    cs: CS,
    sck: SCK,
    mosi: MOSI,
    miso: MISO,
    delay: DELAY,
    timing: BusTiming,
}

impl<CS, SCK, MOSI, MISO, DELAY> BitBangSpi<CS, SCK, MOSI, MISO, DELAY>
where
    CS: OutputPin,
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    DELAY: DelayUs<u32>,
{
    /// Takes the pins and parks the bus idle: chip select high, data low,
    /// clock at its idle level.
    pub fn new(cs: CS, sck: SCK, mosi: MOSI, miso: MISO, delay: DELAY, timing: BusTiming) -> Self {
        let mut spi = Self {
            cs,
            sck,
            mosi,
            miso,
            delay,
            timing,
        };
        spi.cs.set_high().ok();
        spi.mosi.set_low().ok();
        spi.clock(false);
        spi
    }

    /// Releases the pins.
    pub fn release(self) -> (CS, SCK, MOSI, MISO, DELAY) {
        (self.cs, self.sck, self.mosi, self.miso, self.delay)
    }

    /// Drives the clock to its active (`true`) or idle (`false`) level.
    fn clock(&mut self, active: bool) {
        if active != self.timing.clock_idle_high {
            self.sck.set_high().ok();
        } else {
            self.sck.set_low().ok();
        }
    }

    fn drive(&mut self, bit: bool) {
        if bit {
            self.mosi.set_high().ok();
        } else {
            self.mosi.set_low().ok();
        }
    }

    fn sample(&self) -> bool {
        self.miso.is_high().unwrap_or(false)
    }
}

impl<CS, SCK, MOSI, MISO, DELAY> CoreLink for BitBangSpi<CS, SCK, MOSI, MISO, DELAY>
where
    CS: OutputPin,
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    DELAY: DelayUs<u32>,
{
    fn select(&mut self) {
        self.cs.set_high().ok();
        self.delay.delay_us(FRAME_US);
        self.cs.set_low().ok();
        self.delay.delay_us(FRAME_US);
    }

    fn deselect(&mut self) {
        self.delay.delay_us(FRAME_US);
        self.cs.set_high().ok();
        self.delay.delay_us(FRAME_US);
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        let mut received = 0u8;

        for i in (0..8).rev() {
            let bit = (byte >> i) & 1 == 1;

            let sampled = if self.timing.sample_on_first_edge {
                // Data valid before the leading edge, sampled on it.
                self.drive(bit);
                self.delay.delay_us(HALF_BIT_US);
                self.clock(true);
                let s = self.sample();
                self.delay.delay_us(HALF_BIT_US);
                self.clock(false);
                s
            } else {
                // Data launched on the leading edge, sampled on the trailing one.
                self.clock(true);
                self.drive(bit);
                self.delay.delay_us(HALF_BIT_US);
                self.clock(false);
                let s = self.sample();
                self.delay.delay_us(HALF_BIT_US);
                s
            };

            received = (received << 1) | sampled as u8;
        }

        trace!("bitbang tx 0x{:02X} rx 0x{:02X}", byte, received);
        received
    }

    fn timing(&self) -> BusTiming {
        self.timing
    }

    fn set_timing(&mut self, timing: BusTiming) {
        self.timing = timing;
        self.clock(false);
    }
}
