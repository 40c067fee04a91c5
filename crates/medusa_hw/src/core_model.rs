//! Behavioral model of the companion embedded core.
//!
//! Models the core's serial slave, its byte-addressed memory, the reset and
//! fetch-enable inputs, the fetch-done output and the mailbox firmware that
//! runs once an image has been fetched. The pins share state with the link
//! through `Rc<RefCell<_>>`, so a `CoreBridge` can own each of them the way
//! it owns real GPIO lines.

use embedded_hal::digital::v2::{InputPin, OutputPin};
use log::{debug, info};
use medusa_common::core_map;
use medusa_core::bitbang::{BusTiming, CoreLink};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::rc::Rc;

/// Bytes of a frame header: opcode plus a big-endian address.
const HEADER_BYTES: usize = 5;

/// Behavioral switches of the core model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    /// Serial mode the slave samples in; other modes read as floating.
    pub slave_mode: u8,
    /// Data-out strapped to data-in, as with the loopback jumper fitted.
    pub loopback: bool,
    /// Firmware that never answers mailbox commands.
    pub hang: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            slave_mode: 0,
            loopback: false,
            hang: false,
        }
    }
}

#[derive(Default)]
struct CoreState {
    memory: BTreeMap<u32, u8>,
    image_len: usize,
    in_reset: bool,
    fetch_enable: bool,
    booted: bool,
    commands: usize,
}

impl CoreState {
    fn load(&self, address: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self
                .memory
                .get(&address.wrapping_add(i as u32))
                .copied()
                .unwrap_or(0);
        }
        u32::from_be_bytes(bytes)
    }

    fn store(&mut self, address: u32, value: u32) {
        for (i, b) in value.to_be_bytes().into_iter().enumerate() {
            self.memory.insert(address.wrapping_add(i as u32), b);
        }
    }

    fn set_reset(&mut self, asserted: bool) {
        if asserted && !self.in_reset {
            self.booted = false;
        }
        self.in_reset = asserted;
    }

    fn set_fetch_enable(&mut self, high: bool) {
        let rising = high && !self.fetch_enable;
        self.fetch_enable = high;
        if rising && !self.in_reset && self.image_len > 0 && !self.booted {
            self.booted = true;
            self.store(core_map::COMM_STATUS, core_map::STATUS_READY);
            self.store(core_map::COMM_COMMAND, 0);
            info!("core model fetched {} byte image", self.image_len);
        }
    }

    /// Mailbox firmware: runs a command written to the command word.
    fn execute(&mut self, command: u32, hang: bool) {
        if !self.booted {
            return;
        }
        self.commands += 1;
        if hang {
            self.store(core_map::COMM_STATUS, core_map::STATUS_BUSY);
            return;
        }
        let data = self.load(core_map::COMM_DATA);
        let result = match command {
            core_map::CMD_ECHO => Some(data),
            core_map::CMD_ADD_ONE => Some(data.wrapping_add(1)),
            core_map::CMD_SQUARE => Some(data.wrapping_mul(data)),
            _ => None,
        };
        let (result, status) = match result {
            Some(r) => (r, core_map::STATUS_ACK),
            None => (core_map::RESULT_INVALID, core_map::STATUS_ERROR),
        };
        self.store(core_map::COMM_RESULT, result);
        self.store(core_map::COMM_STATUS, status);
        self.store(core_map::COMM_COMMAND, 0);
        debug!("core model command {} -> 0x{:08X}", command, result);
    }
}

/// Serial slave side of the core model.
pub struct CoreModel {
    config: CoreConfig,
    state: Rc<RefCell<CoreState>>,
    timing: BusTiming,
    frame: Vec<u8>,
}

impl CoreModel {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            state: Rc::new(RefCell::new(CoreState::default())),
            timing: BusTiming::default(),
            frame: Vec::new(),
        }
    }

    /// Control lines wired to this core.
    ///
    /// # Returns
    ///
    /// The active-low reset input, the fetch-enable input and the
    /// fetch-done output, in the order `CoreBridge::new` takes them.
    pub fn pins(&self) -> (ResetPin, FetchEnablePin, FetchDonePin) {
        (
            ResetPin(Rc::clone(&self.state)),
            FetchEnablePin(Rc::clone(&self.state)),
            FetchDonePin(Rc::clone(&self.state)),
        )
    }

    /// Word of core memory, big-endian as the core sees it.
    pub fn load(&self, address: u32) -> u32 {
        self.state.borrow().load(address)
    }

    pub fn booted(&self) -> bool {
        self.state.borrow().booted
    }

    /// Mailbox commands the firmware has picked up.
    pub fn commands(&self) -> usize {
        self.state.borrow().commands
    }

    fn answers(&self) -> bool {
        self.timing.mode() == self.config.slave_mode
    }

    fn header_address(&self) -> u32 {
        let f = &self.frame;
        u32::from_be_bytes([f[1], f[2], f[3], f[4]])
    }

    fn complete_frame(&mut self) {
        if !self.answers() || self.config.loopback || self.frame.len() < HEADER_BYTES + 4 {
            return;
        }
        let address = self.header_address();
        let payload = &self.frame[HEADER_BYTES..];
        let mut state = self.state.borrow_mut();
        match self.frame[0] {
            core_map::OP_WRITE_WORD => {
                let value = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                state.store(address, value);
                if address == core_map::COMM_COMMAND && value != 0 {
                    state.execute(value, self.config.hang);
                }
            }
            core_map::OP_WRITE_BURST => {
                let len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let data = &payload[4..];
                let taken = data.len().min(len as usize);
                for (i, &b) in data[..taken].iter().enumerate() {
                    state.memory.insert(address.wrapping_add(i as u32), b);
                }
                if address == core_map::INSTR_MEM_BASE {
                    state.image_len = taken;
                }
                debug!("core model burst of {} bytes at 0x{:08X}", taken, address);
            }
            op => debug!("core model ignored opcode 0x{:02X}", op),
        }
    }
}

impl CoreLink for CoreModel {
    fn select(&mut self) {
        self.frame.clear();
    }

    fn deselect(&mut self) {
        self.complete_frame();
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        self.frame.push(byte);
        if self.config.loopback {
            return byte;
        }
        if !self.answers() {
            return 0xFF;
        }
        // Read frames carry one dummy byte before the data.
        let data_start = HEADER_BYTES + 1;
        let len = self.frame.len();
        if self.frame[0] != core_map::OP_READ || len <= data_start {
            return 0;
        }
        let index = len - 1 - data_start;
        if index < 4 {
            self.load(self.header_address()).to_be_bytes()[index]
        } else {
            0
        }
    }

    fn timing(&self) -> BusTiming {
        self.timing
    }

    fn set_timing(&mut self, timing: BusTiming) {
        self.timing = timing;
    }
}

/// Active-low reset input of the core.
pub struct ResetPin(Rc<RefCell<CoreState>>);

impl OutputPin for ResetPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_reset(true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_reset(false);
        Ok(())
    }
}

/// Fetch-enable input of the core.
pub struct FetchEnablePin(Rc<RefCell<CoreState>>);

impl OutputPin for FetchEnablePin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_fetch_enable(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_fetch_enable(true);
        Ok(())
    }
}

/// Fetch-done output of the core.
pub struct FetchDonePin(Rc<RefCell<CoreState>>);

impl InputPin for FetchDonePin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.0.borrow().booted)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().booted)
    }
}
