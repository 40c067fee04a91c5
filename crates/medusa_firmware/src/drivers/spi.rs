//! SPI master driving the ASIC register front end.
//!
//! Chip select is a plain GPIO owned by the register bus, so this driver
//! only shifts bytes. The transmit and receive FIFOs report full and empty
//! through bit 31 of their data registers.

use embedded_hal::blocking::spi::Transfer;
use medusa_common::mmio::{SPI_BASE, SPI_RXDATA, SPI_SCKDIV, SPI_SCKMODE, SPI_TXDATA};

/// FIFO status flag in the data registers.
const FIFO_FLAG: u32 = 1 << 31;

/// Polls allowed per byte before a transfer is abandoned.
const FIFO_POLLS: u32 = 100_000;

/// Transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiError {
    /// The transmit FIFO never drained.
    TxStalled,
    /// No byte came back for a byte sent.
    RxTimeout,
}

#[inline(always)]
fn reg(offset: usize) -> *mut u32 {
    (SPI_BASE + offset) as *mut u32
}

pub struct Spi;

impl Spi {
    /// Configures the clock divider and SPI mode (0 to 3).
    ///
    /// # Arguments
    ///
    /// * `divider` - Serial clock is the bus clock divided by 2 * (divider + 1)
    /// * `mode` - Clock phase in bit 0, polarity in bit 1
    pub fn new(divider: u32, mode: u8) -> Self {
        unsafe {
            reg(SPI_SCKDIV).write_volatile(divider & 0xFFF);
            reg(SPI_SCKMODE).write_volatile((mode & 0b11) as u32);
        }
        Self
    }

    fn exchange(&mut self, byte: u8) -> Result<u8, SpiError> {
        let mut polls = 0;
        while unsafe { reg(SPI_TXDATA).read_volatile() } & FIFO_FLAG != 0 {
            polls += 1;
            if polls == FIFO_POLLS {
                return Err(SpiError::TxStalled);
            }
        }
        unsafe { reg(SPI_TXDATA).write_volatile(byte as u32) };

        for _ in 0..FIFO_POLLS {
            let rx = unsafe { reg(SPI_RXDATA).read_volatile() };
            if rx & FIFO_FLAG == 0 {
                return Ok(rx as u8);
            }
        }
        Err(SpiError::RxTimeout)
    }
}

impl Transfer<u8> for Spi {
    type Error = SpiError;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], SpiError> {
        for word in words.iter_mut() {
            *word = self.exchange(*word)?;
        }
        Ok(words)
    }
}
