//! Embedded-core bridge.
//!
//! The companion RISC-V core exposes its memory through an SPI slave. Every
//! transaction is one chip-select frame: an opcode, a big-endian address,
//! then data. Word writes carry four data bytes; reads insert one dummy
//! byte before the four response bytes; burst writes carry a length field
//! followed by the raw image bytes.
//!
//! Commands go through a mailbox in the core's data memory: the host
//! writes the operand and the command word, the core firmware sets the
//! status word to ACK (or ERROR) when done, and the result is read back.

use crate::MedusaError;
use crate::bitbang::{BusTiming, CoreLink};
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use log::{debug, info, warn};
use medusa_common::core_map;

/// Reset pulses issued per core reset.
pub const RESET_PULSES: usize = 3;

/// Hold and release time of each reset pulse.
pub const RESET_PULSE_MS: u32 = 100;

/// Bytes streamed per chunk while flashing.
pub const FLASH_CHUNK: usize = 256;

/// Byte patterns sent through the loopback diagnostic.
pub const LOOPBACK_PATTERNS: [u8; 8] = [0x55, 0xAA, 0xFF, 0x00, 0x01, 0x80, 0x33, 0xCC];

/// Timeouts of the bridge's bounded waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Longest wait for a mailbox command to complete.
    pub command_timeout_ms: u32,
    /// Interval between mailbox status reads.
    pub poll_interval_ms: u32,
    /// Longest wait for fetch-done after flashing.
    pub fetch_timeout_ms: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 1000,
            poll_interval_ms: 10,
            fetch_timeout_ms: 1000,
        }
    }
}

/// Host side of the embedded-core link and its control lines.
pub struct CoreBridge<L, RST, FEN, FDONE, D> {
    link: L,
    rstn: RST,
    fetch_en: FEN,
    fetch_done: FDONE,
    delay: D,
    config: BridgeConfig,
}

impl<L, RST, FEN, FDONE, D> CoreBridge<L, RST, FEN, FDONE, D>
where
    L: CoreLink,
    RST: OutputPin,
    FEN: OutputPin,
    FDONE: InputPin,
    D: DelayMs<u32>,
{
    /// Takes the link and control lines; fetch stays disabled.
    pub fn new(link: L, rstn: RST, mut fetch_en: FEN, fetch_done: FDONE, delay: D, config: BridgeConfig) -> Self {
        fetch_en.set_low().ok();
        Self {
            link,
            rstn,
            fetch_en,
            fetch_done,
            delay,
            config,
        }
    }

    /// Mutable access to the serial link.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Releases the link and control lines.
    pub fn release(self) -> (L, RST, FEN, FDONE, D) {
        (self.link, self.rstn, self.fetch_en, self.fetch_done, self.delay)
    }

    /// Resets the core.
    ///
    /// Reset is pulsed several times to ride out a noisy first release,
    /// then fetch-enable is toggled once and left low.
    pub fn reset(&mut self) {
        for _ in 0..RESET_PULSES {
            self.rstn.set_low().ok();
            self.delay.delay_ms(RESET_PULSE_MS);
            self.rstn.set_high().ok();
            self.delay.delay_ms(RESET_PULSE_MS);
        }
        self.fetch_en.set_low().ok();
        self.delay.delay_ms(10);
        self.fetch_en.set_high().ok();
        self.delay.delay_ms(50);
        self.fetch_en.set_low().ok();
        debug!("embedded core reset");
    }

    /// Resets the core and checks that its memory answers.
    ///
    /// # Returns
    ///
    /// `ReadbackMismatch` when the test pattern does not read back.
    pub fn init(&mut self) -> Result<(), MedusaError> {
        self.reset();
        self.write_memory(core_map::INIT_TEST_ADDR, core_map::INIT_TEST_PATTERN);
        self.delay.delay_ms(10);
        let found = self.read_memory(core_map::INIT_TEST_ADDR);
        if found != core_map::INIT_TEST_PATTERN {
            warn!("embedded core init readback 0x{:08X}", found);
            return Err(MedusaError::ReadbackMismatch {
                address: core_map::INIT_TEST_ADDR,
                expected: core_map::INIT_TEST_PATTERN,
                found,
            });
        }
        info!("embedded core initialised");
        Ok(())
    }

    fn send_header(&mut self, opcode: u8, address: u32) {
        self.link.exchange(opcode);
        for byte in address.to_be_bytes() {
            self.link.exchange(byte);
        }
    }

    /// Writes one word of core memory.
    pub fn write_memory(&mut self, address: u32, value: u32) {
        self.link.select();
        self.send_header(core_map::OP_WRITE_WORD, address);
        for byte in value.to_be_bytes() {
            self.link.exchange(byte);
        }
        self.link.deselect();
        debug!("core W 0x{:08X} <- 0x{:08X}", address, value);
    }

    /// Reads one word of core memory.
    pub fn read_memory(&mut self, address: u32) -> u32 {
        self.link.select();
        self.send_header(core_map::OP_READ, address);
        self.link.exchange(0x00);
        let mut bytes = [0u8; 4];
        for b in bytes.iter_mut() {
            *b = self.link.exchange(0x00);
        }
        self.link.deselect();
        let value = u32::from_be_bytes(bytes);
        debug!("core R 0x{:08X} -> 0x{:08X}", address, value);
        value
    }

    /// Flashes an executable image into instruction memory and starts it.
    ///
    /// The image is streamed as one burst write at the instruction memory
    /// base. Fetch is then enabled and fetch-done awaited.
    ///
    /// # Returns
    ///
    /// `FetchTimeout` when fetch-done does not rise in time. The image has
    /// been written either way.
    pub fn flash_image(&mut self, image: &[u8]) -> Result<(), MedusaError> {
        info!("flashing {} byte image", image.len());
        self.reset();

        self.link.select();
        self.send_header(core_map::OP_WRITE_BURST, core_map::INSTR_MEM_BASE);
        for byte in (image.len() as u32).to_be_bytes() {
            self.link.exchange(byte);
        }
        for (i, chunk) in image.chunks(FLASH_CHUNK).enumerate() {
            for &byte in chunk {
                self.link.exchange(byte);
            }
            debug!("chunk {} sent ({} bytes)", i, chunk.len());
        }
        self.link.deselect();

        self.rstn.set_high().ok();
        self.delay.delay_ms(50);
        self.fetch_en.set_high().ok();

        let mut waited = 0;
        while !self.fetch_done.is_high().unwrap_or(false) {
            if waited >= self.config.fetch_timeout_ms {
                warn!("fetch done not seen after {} ms", waited);
                return Err(MedusaError::FetchTimeout);
            }
            self.delay.delay_ms(1);
            waited += 1;
        }
        info!("image running");
        Ok(())
    }

    /// Reads instruction memory back and compares it with `image`.
    ///
    /// Words are compared in big-endian byte order; a trailing partial
    /// word compares only the bytes the image has.
    pub fn verify_image(&mut self, image: &[u8]) -> Result<(), MedusaError> {
        for (i, chunk) in image.chunks(4).enumerate() {
            let address = core_map::INSTR_MEM_BASE + 4 * i as u32;
            let found = self.read_memory(address);
            let mut expected = [0u8; 4];
            expected[..chunk.len()].copy_from_slice(chunk);
            if found.to_be_bytes()[..chunk.len()] != *chunk {
                return Err(MedusaError::ReadbackMismatch {
                    address,
                    expected: u32::from_be_bytes(expected),
                    found,
                });
            }
        }
        info!("image verified ({} bytes)", image.len());
        Ok(())
    }

    /// Runs one mailbox command on the core.
    ///
    /// The core must report ready before the command is posted. Completion
    /// is awaited for at most the configured command timeout; afterwards
    /// the mailbox is handed back by restoring the ready status.
    pub fn send_command(&mut self, command: u32, operand: u32) -> Result<u32, MedusaError> {
        let status = self.read_memory(core_map::COMM_STATUS);
        if status != core_map::STATUS_READY {
            warn!("core not ready (0x{:X})", status);
            return Err(MedusaError::CoreNotReady { status });
        }

        self.write_memory(core_map::COMM_DATA, operand);
        self.write_memory(core_map::COMM_COMMAND, command);

        let mut waited = 0;
        loop {
            let status = self.read_memory(core_map::COMM_STATUS);
            match status {
                core_map::STATUS_ACK => break,
                core_map::STATUS_ERROR => {
                    self.write_memory(core_map::COMM_STATUS, core_map::STATUS_READY);
                    return Err(MedusaError::CommandFailed { status });
                }
                _ => {}
            }
            if waited >= self.config.command_timeout_ms {
                warn!("command {} timed out (status 0x{:X})", command, status);
                return Err(MedusaError::CommandTimeout);
            }
            self.delay.delay_ms(self.config.poll_interval_ms);
            waited += self.config.poll_interval_ms;
        }

        let result = self.read_memory(core_map::COMM_RESULT);
        self.write_memory(core_map::COMM_STATUS, core_map::STATUS_READY);
        debug!("command {}({}) -> {}", command, operand, result);
        Ok(result)
    }

    /// Sends fixed byte patterns and checks each one comes back unchanged.
    ///
    /// Requires data-out jumpered to data-in. Runs in SPI mode 0 and
    /// restores the previous timing afterwards.
    pub fn test_loopback(&mut self) -> bool {
        let saved = self.link.timing();
        self.link.set_timing(BusTiming::default());

        let mut passed = true;
        for pattern in LOOPBACK_PATTERNS {
            self.link.select();
            let received = self.link.exchange(pattern);
            self.link.deselect();
            if received != pattern {
                warn!("loopback 0x{:02X} -> 0x{:02X}", pattern, received);
                passed = false;
            }
        }

        self.link.set_timing(saved);
        passed
    }

    /// Finds a clock polarity and phase the core answers in.
    ///
    /// Tries modes 0 to 3 with a scratch write and readback. The link is left
    /// in the first working mode, or in its previous mode if none works.
    pub fn sweep_spi_modes(&mut self) -> Option<BusTiming> {
        let saved = self.link.timing();
        let mut working = None;

        for mode in 0..4 {
            let Some(timing) = BusTiming::from_mode(mode) else {
                continue;
            };
            self.link.set_timing(timing);
            self.write_memory(core_map::SCRATCH_ADDR, core_map::SWEEP_PATTERN);
            let found = self.read_memory(core_map::SCRATCH_ADDR);
            let ok = found == core_map::SWEEP_PATTERN;
            info!("spi mode {}: {}", mode, if ok { "ok" } else { "no response" });
            if ok && working.is_none() {
                working = Some(timing);
            }
        }

        self.link.set_timing(working.unwrap_or(saved));
        working
    }
}

/// Embedded-core operations the test bench dispatches to.
///
/// Implemented by `CoreBridge`; lets the bench stay generic over the pins
/// and link the bridge is built from.
pub trait CorePort {
    fn flash_image(&mut self, image: &[u8]) -> Result<(), MedusaError>;
    fn verify_image(&mut self, image: &[u8]) -> Result<(), MedusaError>;
    fn send_command(&mut self, command: u32, operand: u32) -> Result<u32, MedusaError>;
    fn read_memory(&mut self, address: u32) -> u32;
    fn write_memory(&mut self, address: u32, value: u32);
    fn test_loopback(&mut self) -> bool;
    fn sweep_spi_modes(&mut self) -> Option<BusTiming>;
}

impl<L, RST, FEN, FDONE, D> CorePort for CoreBridge<L, RST, FEN, FDONE, D>
where
    L: CoreLink,
    RST: OutputPin,
    FEN: OutputPin,
    FDONE: InputPin,
    D: DelayMs<u32>,
{
    fn flash_image(&mut self, image: &[u8]) -> Result<(), MedusaError> {
        CoreBridge::flash_image(self, image)
    }

    fn verify_image(&mut self, image: &[u8]) -> Result<(), MedusaError> {
        CoreBridge::verify_image(self, image)
    }

    fn send_command(&mut self, command: u32, operand: u32) -> Result<u32, MedusaError> {
        CoreBridge::send_command(self, command, operand)
    }

    fn read_memory(&mut self, address: u32) -> u32 {
        CoreBridge::read_memory(self, address)
    }

    fn write_memory(&mut self, address: u32, value: u32) {
        CoreBridge::write_memory(self, address, value)
    }

    fn test_loopback(&mut self) -> bool {
        CoreBridge::test_loopback(self)
    }

    fn sweep_spi_modes(&mut self) -> Option<BusTiming> {
        CoreBridge::sweep_spi_modes(self)
    }
}
