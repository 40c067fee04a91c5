//! Test doubles shared by the unit tests of this crate.

use crate::bitbang::{BusTiming, CoreLink};
use crate::bus::RegisterBus;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use medusa_common::core_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Write(u32, u32),
    Read(u32),
}

/// Register bus that records every access and answers reads from a script.
///
/// Scripted values for an address are consumed in order; once exhausted the
/// sticky value for that address is returned, then the default.
pub struct FakeBus {
    pub ops: Vec<Op>,
    scripted: BTreeMap<u32, VecDeque<u32>>,
    sticky: BTreeMap<u32, u32>,
    default_read: u32,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            scripted: BTreeMap::new(),
            sticky: BTreeMap::new(),
            default_read: 0,
        }
    }

    pub fn set_default_read(&mut self, value: u32) {
        self.default_read = value;
    }

    pub fn script(&mut self, address: u32, values: &[u32]) {
        self.scripted
            .entry(address)
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn set(&mut self, address: u32, value: u32) {
        self.sticky.insert(address, value);
    }

    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(a, d) => Some((*a, *d)),
                Op::Read(_) => None,
            })
            .collect()
    }

    pub fn writes_to(&self, address: u32) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, d)| d)
            .collect()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl RegisterBus for FakeBus {
    fn write_register(&mut self, address: u32, data: u32) {
        self.ops.push(Op::Write(address, data));
    }

    fn read_register(&mut self, address: u32) -> u32 {
        self.ops.push(Op::Read(address));
        if let Some(v) = self.scripted.get_mut(&address).and_then(|q| q.pop_front()) {
            return v;
        }
        self.sticky
            .get(&address)
            .copied()
            .unwrap_or(self.default_read)
    }
}

/// Delay provider that returns immediately and counts requested time.
#[derive(Default, Clone, Copy)]
pub struct NoDelay;

impl DelayUs<u32> for NoDelay {
    fn delay_us(&mut self, _us: u32) {}
}

impl DelayMs<u32> for NoDelay {
    fn delay_ms(&mut self, _ms: u32) {}
}

/// Delay provider that accumulates the requested microseconds.
pub struct CountingDelay<'a> {
    pub total_us: &'a Cell<u64>,
}

impl DelayUs<u32> for CountingDelay<'_> {
    fn delay_us(&mut self, us: u32) {
        self.total_us.set(self.total_us.get() + us as u64);
    }
}

impl DelayMs<u32> for CountingDelay<'_> {
    fn delay_ms(&mut self, ms: u32) {
        self.total_us.set(self.total_us.get() + ms as u64 * 1000);
    }
}

pub type PinLog = RefCell<Vec<bool>>;

/// Output pin that appends every level it is driven to.
pub struct RecordingPin<'a> {
    log: &'a PinLog,
}

impl<'a> RecordingPin<'a> {
    pub fn new(log: &'a PinLog) -> Self {
        Self { log }
    }
}

impl OutputPin for RecordingPin<'_> {
    type Error = ();

    fn set_low(&mut self) -> Result<(), ()> {
        self.log.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), ()> {
        self.log.borrow_mut().push(true);
        Ok(())
    }
}

/// Input pin reading a shared level.
pub struct LevelPin<'a> {
    pub level: &'a Cell<bool>,
}

impl InputPin for LevelPin<'_> {
    type Error = ();

    fn is_high(&self) -> Result<bool, ()> {
        Ok(self.level.get())
    }

    fn is_low(&self) -> Result<bool, ()> {
        Ok(!self.level.get())
    }
}

/// Output pin driving a shared level.
pub struct DrivePin<'a> {
    pub level: &'a Cell<bool>,
}

impl OutputPin for DrivePin<'_> {
    type Error = ();

    fn set_low(&mut self) -> Result<(), ()> {
        self.level.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), ()> {
        self.level.set(true);
        Ok(())
    }
}

/// Embedded core answering at transaction level.
///
/// Records every frame, keeps byte-addressed memory and runs mailbox
/// commands the way the core firmware does.
pub struct FakeCore {
    pub frames: Vec<Vec<u8>>,
    pub stuck_at: Option<u8>,
    pub loopback: bool,
    pub hang: bool,
    pub only_mode: Option<u8>,
    memory: BTreeMap<u32, u8>,
    frame: Vec<u8>,
    timing: BusTiming,
}

impl FakeCore {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            stuck_at: None,
            loopback: false,
            hang: false,
            only_mode: None,
            memory: BTreeMap::new(),
            frame: Vec::new(),
            timing: BusTiming::default(),
        }
    }

    /// A core whose firmware has set the mailbox ready.
    pub fn ready() -> Self {
        let mut core = Self::new();
        core.store(core_map::COMM_STATUS, core_map::STATUS_READY);
        core
    }

    pub fn load(&self, address: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.memory.get(&(address + i as u32)).copied().unwrap_or(0);
        }
        u32::from_be_bytes(bytes)
    }

    pub fn store(&mut self, address: u32, value: u32) {
        for (i, b) in value.to_be_bytes().into_iter().enumerate() {
            self.memory.insert(address + i as u32, b);
        }
    }

    fn answers(&self) -> bool {
        self.only_mode.is_none_or(|m| m == self.timing.mode())
    }

    fn header(&self, at: usize) -> u32 {
        let f = &self.frame;
        u32::from_be_bytes([f[at], f[at + 1], f[at + 2], f[at + 3]])
    }

    fn execute(&mut self, command: u32) {
        if self.hang {
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
        match result {
            Some(r) => {
                self.store(core_map::COMM_RESULT, r);
                self.store(core_map::COMM_STATUS, core_map::STATUS_ACK);
            }
            None => {
                self.store(core_map::COMM_RESULT, core_map::RESULT_INVALID);
                self.store(core_map::COMM_STATUS, core_map::STATUS_ERROR);
            }
        }
        self.store(core_map::COMM_COMMAND, 0);
    }

    fn complete_frame(&mut self) {
        if !self.answers() || self.frame.len() < 9 {
            return;
        }
        let address = self.header(1);
        match self.frame[0] {
            core_map::OP_WRITE_WORD => {
                let value = self.header(5);
                self.store(address, value);
                if address == core_map::COMM_COMMAND && value != 0 {
                    self.execute(value);
                }
            }
            core_map::OP_WRITE_BURST => {
                let data: Vec<u8> = self.frame[9..].to_vec();
                for (i, b) in data.into_iter().enumerate() {
                    self.memory.insert(address + i as u32, b);
                }
            }
            _ => {}
        }
    }
}

impl CoreLink for FakeCore {
    fn select(&mut self) {
        self.frame.clear();
    }

    fn deselect(&mut self) {
        self.frames.push(self.frame.clone());
        self.complete_frame();
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        self.frame.push(byte);
        if self.loopback {
            return byte;
        }
        if !self.answers() {
            return 0xFF;
        }
        let len = self.frame.len();
        if self.frame[0] != core_map::OP_READ || len < 7 {
            return 0;
        }
        if let Some(v) = self.stuck_at {
            return v;
        }
        let index = len - 7;
        if index < 4 {
            self.load(self.header(1)).to_be_bytes()[index]
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

/// Pin that accepts every level and always reads high.
#[derive(Default, Clone, Copy)]
pub struct IdlePin;

impl OutputPin for IdlePin {
    type Error = ();

    fn set_low(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

impl InputPin for IdlePin {
    type Error = ();

    fn is_high(&self) -> Result<bool, ()> {
        Ok(true)
    }

    fn is_low(&self) -> Result<bool, ()> {
        Ok(false)
    }
}
