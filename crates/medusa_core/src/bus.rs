//! Register bus transport.
//!
//! Every MEDUSA register transaction is a chip-select framed SPI exchange:
//! a one-byte opcode, a 32-bit big-endian address, then either the 32-bit
//! data word (write) or dummy bytes followed by the response word (read).
//! The transport never reports failure; a dead or floating bus reads back
//! as all ones, and callers detect that with `is_unresponsive`.

use crate::MedusaError;
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use log::{debug, trace, warn};
use medusa_common::opcodes;
use medusa_common::regs;

/// Value read from a bus with nothing driving the data-in line.
pub const ALL_ONES: u32 = 0xFFFF_FFFF;

/// Settle time after a read before the chip's internal latch accepts the
/// next transaction.
pub const READ_SETTLE_US: u32 = 1000;

/// Chip-select setup and hold time around every transaction.
pub const CS_SETUP_US: u32 = 1;

/// Register-level access to the ASIC.
///
/// Implemented by the hardware SPI transport, by the TCP hardware-in-the-loop
/// client and by the behavioral chip model.
pub trait RegisterBus {
    /// Writes one 32-bit register.
    fn write_register(&mut self, address: u32, data: u32);

    /// Reads one 32-bit register.
    ///
    /// Returns raw bus data; an unresponsive chip yields `ALL_ONES`.
    fn read_register(&mut self, address: u32) -> u32;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    fn write_register(&mut self, address: u32, data: u32) {
        (**self).write_register(address, data)
    }

    fn read_register(&mut self, address: u32) -> u32 {
        (**self).read_register(address)
    }
}

/// Returns true when a readback is the floating-bus sentinel.
pub fn is_unresponsive(word: u32) -> bool {
    word == ALL_ONES
}

/// Checks that the chip answers on the bus.
///
/// Reads the global control register, which never holds all ones on a
/// live chip because its upper reserved bits read as zero.
///
/// # Returns
///
/// The register value, or `ChipNotResponding` on a sentinel readback.
pub fn check_presence<B: RegisterBus + ?Sized>(bus: &mut B) -> Result<u32, MedusaError> {
    let value = bus.read_register(regs::GLBL_CTRL);
    if is_unresponsive(value) {
        warn!("presence check of 0x{:08X} read all ones", regs::GLBL_CTRL);
        return Err(MedusaError::ChipNotResponding);
    }
    Ok(value)
}

/// Register bus over a hardware SPI peripheral.
///
/// Owns the SPI master, a dedicated chip-select pin and a delay provider.
/// The delays are part of the chip's timing contract: the read settle time
/// in particular must not be shortened.
pub struct SpiRegisterBus<SPI, CS, DELAY> {
    spi: SPI,
    cs: CS,
    delay: DELAY,
}

impl<SPI, CS, DELAY> SpiRegisterBus<SPI, CS, DELAY>
where
    SPI: Transfer<u8>,
    SPI::Error: core::fmt::Debug,
    CS: OutputPin,
    DELAY: DelayUs<u32>,
{
    /// Wraps the peripherals and parks chip select high.
    pub fn new(spi: SPI, mut cs: CS, delay: DELAY) -> Self {
        cs.set_high().ok();
        Self { spi, cs, delay }
    }

    /// Writes the chip's SPI configuration registers.
    ///
    /// Selects the number of dummy cycles between a read address and its
    /// data, then switches the front end to single-wire SPI. Must run once
    /// after power-up before any register access.
    pub fn configure(&mut self) {
        self.write_config(opcodes::W_REG1, opcodes::DUMMY_CYCLES);
        self.write_config(opcodes::W_REG0, opcodes::SINGLE_SPI);
        debug!(
            "spi front end configured: {} dummy cycles, single spi",
            opcodes::DUMMY_CYCLES
        );
    }

    /// Releases the peripherals.
    pub fn release(self) -> (SPI, CS, DELAY) {
        (self.spi, self.cs, self.delay)
    }

    fn write_config(&mut self, cmd: u8, data: u8) {
        let mut buffer = [cmd, data];
        self.transaction(&mut buffer);
    }

    /// Runs one chip-select framed exchange in place.
    fn transaction(&mut self, buffer: &mut [u8]) -> bool {
        self.cs.set_low().ok();
        self.delay.delay_us(CS_SETUP_US);

        let ok = match self.spi.transfer(buffer) {
            Ok(_) => true,
            Err(e) => {
                warn!("spi transfer failed: {:?}", e);
                false
            }
        };

        self.delay.delay_us(CS_SETUP_US);
        self.cs.set_high().ok();
        ok
    }
}

impl<SPI, CS, DELAY> RegisterBus for SpiRegisterBus<SPI, CS, DELAY>
where
    SPI: Transfer<u8>,
    SPI::Error: core::fmt::Debug,
    CS: OutputPin,
    DELAY: DelayUs<u32>,
{
    fn write_register(&mut self, address: u32, data: u32) {
        let a = address.to_be_bytes();
        let d = data.to_be_bytes();
        let mut buffer = [opcodes::WRITE, a[0], a[1], a[2], a[3], d[0], d[1], d[2], d[3]];
        self.transaction(&mut buffer);
        trace!("W 0x{:08X} <- 0x{:08X}", address, data);
    }

    fn read_register(&mut self, address: u32) -> u32 {
        const DATA_AT: usize = 5 + opcodes::READ_DUMMY_BYTES;

        let a = address.to_be_bytes();
        let mut buffer = [0u8; DATA_AT + 4];
        buffer[0] = opcodes::READ;
        buffer[1..5].copy_from_slice(&a);

        let ok = self.transaction(&mut buffer);
        self.delay.delay_us(READ_SETTLE_US);

        if !ok {
            return ALL_ONES;
        }

        let value = u32::from_be_bytes([
            buffer[DATA_AT],
            buffer[DATA_AT + 1],
            buffer[DATA_AT + 2],
            buffer[DATA_AT + 3],
        ]);
        trace!("R 0x{:08X} -> 0x{:08X}", address, value);
        value
    }
}
