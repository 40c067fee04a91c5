//! Shadow state of the shared control registers.
//!
//! The global control and sampling control registers each hold two 16-bit
//! halves, one per tile. Their flags are typed with `bitflags`, and a
//! `SplitRegister` owns the full 32-bit value so each tile's half can be
//! updated without disturbing the other.

use bitflags::{Flags, bitflags};
use core::marker::PhantomData;
use medusa_common::Tile;

bitflags! {
    /// Per-tile half of the global control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TileControl: u16 {
        /// Starts the analog solve on this tile.
        const RUN = 1 << 0;
        /// Holds the relaxation oscillators in reset.
        const RXO_RST = 1 << 1;
        /// Couples this tile's oscillators to the other tile.
        const RXO_MODE = 1 << 2;
        /// Active-low enable of the top clause-section switch.
        const CLS_SW_ENB_TOP = 1 << 3;
        /// Active-low enable of the bottom clause-section switch.
        const CLS_SW_ENB_BOT = 1 << 4;
    }
}

bitflags! {
    /// Per-tile half of the sampling control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SamplingControl: u16 {
        /// Clock divider, bit 0.
        const CLK_DIV0 = 1 << 0;
        /// Clock divider, bit 1.
        const CLK_DIV1 = 1 << 1;
        /// Sample the error-bar output instead of the raw comparator.
        const ERRB_MODE = 1 << 2;
        /// Continuous sampling mode.
        const SMPL_MODE = 1 << 3;
        /// Active-low sampler reset.
        const SMPL_RSTB = 1 << 4;
    }
}

/// Largest valid sampling clock divider.
pub const MAX_CLOCK_DIVIDER: u8 = 3;

/// Largest valid sampling mode.
pub const MAX_SAMPLING_MODE: u8 = 3;

impl SamplingControl {
    /// Builds the configuration half for a tile's sampler.
    ///
    /// The sampler is released from reset; mode bit 1 selects continuous
    /// sampling and mode bit 0 the error-bar output. Arguments must already
    /// be within range.
    pub fn config(clock_divider: u8, mode: u8) -> Self {
        let mut flags = SamplingControl::SMPL_RSTB;
        if mode & 0b10 != 0 {
            flags |= SamplingControl::SMPL_MODE;
        }
        if mode & 0b01 != 0 {
            flags |= SamplingControl::ERRB_MODE;
        }
        if clock_divider & 0b10 != 0 {
            flags |= SamplingControl::CLK_DIV1;
        }
        if clock_divider & 0b01 != 0 {
            flags |= SamplingControl::CLK_DIV0;
        }
        flags
    }
}

/// A 32-bit register split into one typed 16-bit half per tile.
///
/// Holds the last value written to hardware. It is the single source of
/// truth for the register and is never refreshed from the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRegister<F> {
    value: u32,
    _flags: PhantomData<F>,
}

/// Shadow of the global control register.
pub type GlobalControl = SplitRegister<TileControl>;

/// Shadow of the sampling control register.
pub type SamplingRegister = SplitRegister<SamplingControl>;

impl<F> SplitRegister<F>
where
    F: Flags<Bits = u16> + Copy,
{
    /// Creates a shadow holding `value`.
    pub const fn from_bits(value: u32) -> Self {
        Self {
            value,
            _flags: PhantomData,
        }
    }

    /// Full 32-bit value to write to hardware.
    pub const fn bits(&self) -> u32 {
        self.value
    }

    /// Flags of one tile's half.
    pub fn half(&self, tile: Tile) -> F {
        F::from_bits_retain((self.value >> tile.half_shift()) as u16)
    }

    /// Replaces one tile's half, leaving the other untouched.
    pub fn set_half(&mut self, tile: Tile, flags: F) {
        let shift = tile.half_shift();
        self.value = (self.value & !(0xFFFF << shift)) | ((flags.bits() as u32) << shift);
    }

    /// Sets `flags` in one tile's half.
    pub fn insert(&mut self, tile: Tile, flags: F) {
        let bits = self.half(tile).bits() | flags.bits();
        self.set_half(tile, F::from_bits_retain(bits));
    }

    /// Clears `flags` in one tile's half.
    pub fn remove(&mut self, tile: Tile, flags: F) {
        let bits = self.half(tile).bits() & !flags.bits();
        self.set_half(tile, F::from_bits_retain(bits));
    }

    /// Returns true when every flag in `flags` is set in the tile's half.
    pub fn contains(&self, tile: Tile, flags: F) -> bool {
        let bits = flags.bits();
        self.half(tile).bits() & bits == bits
    }
}

impl GlobalControl {
    /// Power-on shadow: both clause-section switches of both tiles open.
    pub const fn power_on() -> Self {
        let half = TileControl::CLS_SW_ENB_TOP.bits() | TileControl::CLS_SW_ENB_BOT.bits();
        Self::from_bits((half as u32) << 16 | half as u32)
    }
}

impl Default for GlobalControl {
    fn default() -> Self {
        Self::power_on()
    }
}

impl Default for SamplingRegister {
    fn default() -> Self {
        Self::from_bits(0)
    }
}
