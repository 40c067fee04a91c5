//! Tile controller.
//!
//! Builds every tile-level operation out of register writes: baseline reset,
//! clause bias pre-charge, clause loading, relaxation-oscillator arming and
//! sampler configuration. The controller owns the shadows of the two shared
//! control registers, so it is the only writer of those registers.

use crate::MedusaError;
use crate::bus::{RegisterBus, is_unresponsive};
use crate::cnf::Clause;
use crate::control::{
    GlobalControl, MAX_CLOCK_DIVIDER, MAX_SAMPLING_MODE, SamplingControl, SamplingRegister,
    TileControl,
};
use crate::encoder::{self, WL_FIRST_IDLE, WL_LAST_IDLE};
use log::{debug, info, warn};
use medusa_common::Tile;
use medusa_common::geometry::{
    BL_WORDS, CLS_DISABLE_BIT, DOUT_WORDS, HALF_CLS, RXO_WL_WORD, SECT_CLS, VAR_WORDS,
    VARS_PER_WORD, WL_WORDS,
};
use medusa_common::regs;

/// First word-line word with the top bias line asserted.
const WL_FIRST_BIAS: u32 = WL_FIRST_IDLE | 1 << 1;

/// Last word-line word with the bottom bias line asserted.
const WL_LAST_BIAS: u32 = WL_LAST_IDLE | 1 << 30;

/// Oscillator word-line pulse latching the bias pattern.
const RXO_BIAS_PULSE: u32 = 0x04;

/// Oscillator word-line pulse latching the enable pattern.
const RXO_ENABLE_PULSE: u32 = 0x1B;

/// Per-variable bias pattern byte (four variables per byte).
const RXO_BIAS_BYTE: u8 = 0xF0;

/// Enable pattern byte when only the top clause half is in use.
const RXO_ENABLE_BYTE: u8 = 0x0C;

/// Enable pattern byte when both clause halves are in use.
const RXO_ENABLE_BYTE_FULL: u8 = 0x3C;

/// Bit-line patterns for the relaxation oscillators of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OscillatorPattern {
    /// Bit-line words in use.
    pub words: usize,
    /// Bias pattern per word.
    pub bias: [u32; VAR_WORDS],
    /// Enable pattern per word.
    pub enable: [u32; VAR_WORDS],
}

impl OscillatorPattern {
    /// Computes the patterns for `num_var` variables.
    ///
    /// Whole words of sixteen variables use the replicated pattern byte. A
    /// trailing partial word keeps only the bytes that cover its variables.
    pub fn new(num_var: usize, num_cls: usize) -> Self {
        let whole = num_var / VARS_PER_WORD;
        let part = num_var % VARS_PER_WORD;
        let words = whole + (part != 0) as usize;
        let part_bytes = part.div_ceil(4);

        let enable_byte = if num_cls > HALF_CLS {
            RXO_ENABLE_BYTE_FULL
        } else {
            RXO_ENABLE_BYTE
        };

        let mut bias = [0u32; VAR_WORDS];
        let mut enable = [0u32; VAR_WORDS];
        for i in 0..words.min(VAR_WORDS) {
            let bytes = if i < whole { 4 } else { part_bytes };
            bias[i] = replicate(RXO_BIAS_BYTE, bytes);
            enable[i] = replicate(enable_byte, bytes);
        }

        Self {
            words: words.min(VAR_WORDS),
            bias,
            enable,
        }
    }
}

/// Repeats `byte` into the low `count` bytes of a word.
fn replicate(byte: u8, count: usize) -> u32 {
    let full = u32::from_ne_bytes([byte; 4]);
    if count >= 4 {
        full
    } else {
        full & ((1u32 << (8 * count)) - 1)
    }
}

/// Validates sampler parameters, clamping out-of-range values.
fn checked_sampling(clock_divider: u8, mode: u8) -> (u8, u8) {
    let mut div = clock_divider;
    let mut m = mode;
    if div > MAX_CLOCK_DIVIDER {
        warn!(
            "clock divider {} out of range, using {}",
            clock_divider, MAX_CLOCK_DIVIDER
        );
        div = MAX_CLOCK_DIVIDER;
    }
    if m > MAX_SAMPLING_MODE {
        warn!("sampling mode {} out of range, using {}", mode, MAX_SAMPLING_MODE);
        m = MAX_SAMPLING_MODE;
    }
    (div, m)
}

/// Owner of the register bus and the shared control shadows.
pub struct TileController<B> {
    bus: B,
    control: GlobalControl,
    sampling: SamplingRegister,
}

impl<B: RegisterBus> TileController<B> {
    /// Creates a controller with power-on shadows.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            control: GlobalControl::power_on(),
            sampling: SamplingRegister::default(),
        }
    }

    /// Mutable access to the underlying bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Releases the bus.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Last value written to the global control register.
    pub fn control(&self) -> GlobalControl {
        self.control
    }

    /// Last value written to the sampling control register.
    pub fn sampling(&self) -> SamplingRegister {
        self.sampling
    }

    fn write_control(&mut self) {
        self.bus.write_register(regs::GLBL_CTRL, self.control.bits());
    }

    fn write_sampling(&mut self) {
        self.bus.write_register(regs::SMPL_CTRL, self.sampling.bits());
    }

    fn write_wl(&mut self, tile: Tile, word: usize, value: u32) {
        self.bus.write_register(tile.wl_addr(word), value);
    }

    fn write_bl(&mut self, tile: Tile, word: usize, value: u32) {
        self.bus.write_register(tile.bl_addr(word), value);
    }

    fn fill_bl(&mut self, tile: Tile, value: u32) {
        for word in 0..BL_WORDS {
            self.write_bl(tile, word, value);
        }
    }

    /// Returns a tile to its disabled baseline.
    ///
    /// Every word line and bit line is driven low, then the top and bottom
    /// reset indicators are released. The write sequence does not depend on
    /// prior state.
    pub fn reset(&mut self, tile: Tile) {
        for word in 0..WL_WORDS {
            self.write_wl(tile, word, 0);
        }
        self.fill_bl(tile, 0);
        self.write_wl(tile, 0, WL_FIRST_IDLE);
        self.write_wl(tile, WL_WORDS - 1, WL_LAST_IDLE);
        debug!("{} tile reset", tile.name());
    }

    /// Closes the clause-section switches needed for `num_cls` clauses and
    /// pre-charges the clause bias network.
    ///
    /// Sections that hold no clauses stay electrically isolated.
    pub fn setup_clause_bias(&mut self, tile: Tile, num_cls: usize) {
        let mut closed = TileControl::empty();
        if num_cls > HALF_CLS + SECT_CLS {
            closed = TileControl::CLS_SW_ENB_TOP | TileControl::CLS_SW_ENB_BOT;
        } else if num_cls > SECT_CLS {
            closed = TileControl::CLS_SW_ENB_TOP;
        }
        let all = TileControl::CLS_SW_ENB_TOP | TileControl::CLS_SW_ENB_BOT;
        self.control.insert(tile, all.difference(closed));
        self.control.remove(tile, closed);
        self.write_control();

        let both_halves = num_cls > HALF_CLS;
        self.fill_bl(tile, 0xFFFF_FFFF);
        self.write_wl(tile, WL_WORDS - 1, WL_LAST_BIAS);
        if both_halves {
            self.write_wl(tile, 0, WL_FIRST_BIAS);
        }
        self.write_wl(tile, WL_WORDS - 1, WL_LAST_IDLE);
        if both_halves {
            self.write_wl(tile, 0, WL_FIRST_IDLE);
        }
        self.fill_bl(tile, 0);
        debug!("{} tile biased for {} clauses", tile.name(), num_cls);
    }

    /// Disconnects every clause row of a tile.
    ///
    /// Drives the row disconnect bit while pulsing all clause rows at once.
    /// The bias lines and the oscillator word are left alone.
    pub fn disable_all_clauses(&mut self, tile: Tile) {
        let last = WL_WORDS - 1;
        self.write_bl(tile, BL_WORDS - 1, 1 << CLS_DISABLE_BIT);

        for word in 0..WL_WORDS {
            let value = match word {
                0 => !(1u32 << 1),
                w if w == last => !(1u32 << 30),
                w if w == RXO_WL_WORD => continue,
                _ => 0xFFFF_FFFF,
            };
            self.write_wl(tile, word, value);
        }
        for word in 0..WL_WORDS {
            let value = match word {
                0 => WL_FIRST_IDLE,
                w if w == last => WL_LAST_IDLE,
                w if w == RXO_WL_WORD => continue,
                _ => 0,
            };
            self.write_wl(tile, word, value);
        }

        self.write_bl(tile, BL_WORDS - 1, 0);
    }

    /// Loads a clause list into a tile's clause memory.
    ///
    /// All rows are disconnected first so rows beyond the list stay out of
    /// the formula. Clauses must already be validated.
    pub fn write_clauses(&mut self, tile: Tile, clauses: &[Clause]) {
        self.disable_all_clauses(tile);
        for (i, clause) in clauses.iter().enumerate() {
            let encoded = encoder::encode_clause(i, clause);
            encoder::program_clause(&mut self.bus, tile, &encoded);
        }
        info!("{} tile loaded with {} clauses", tile.name(), clauses.len());
    }

    /// Arms the relaxation oscillators of one tile for independent solving.
    ///
    /// Pulses the oscillator reset, latches the bias pattern, then latches
    /// the enable pattern.
    pub fn setup_oscillators(&mut self, tile: Tile, num_var: usize, num_cls: usize) {
        let pattern = OscillatorPattern::new(num_var, num_cls);

        self.control.insert(tile, TileControl::RXO_RST);
        self.write_control();
        self.control.remove(tile, TileControl::RXO_RST | TileControl::RXO_MODE);
        self.write_control();

        for i in 0..pattern.words {
            self.write_bl(tile, i, pattern.bias[i]);
        }
        self.write_wl(tile, RXO_WL_WORD, RXO_BIAS_PULSE);
        self.write_wl(tile, RXO_WL_WORD, 0);

        for i in 0..pattern.words {
            self.write_bl(tile, i, pattern.enable[i]);
        }
        self.write_wl(tile, RXO_WL_WORD, RXO_ENABLE_PULSE);
        self.write_wl(tile, RXO_WL_WORD, 0);
        debug!("{} oscillators armed ({} words)", tile.name(), pattern.words);
    }

    /// Arms the oscillators of both tiles with the coupling bit asserted.
    ///
    /// The tiles are held in reset together and every pattern write and
    /// pulse is issued to the right tile then the left tile.
    pub fn setup_oscillators_coupled(&mut self, num_var: usize, num_cls: usize) {
        let pattern = OscillatorPattern::new(num_var, num_cls);

        for tile in Tile::ALL {
            self.control.insert(tile, TileControl::RXO_RST);
        }
        self.write_control();
        for tile in Tile::ALL {
            self.control.remove(tile, TileControl::RXO_RST);
            self.control.insert(tile, TileControl::RXO_MODE);
        }
        self.write_control();

        self.latch_coupled(&pattern.bias[..pattern.words], RXO_BIAS_PULSE);
        self.latch_coupled(&pattern.enable[..pattern.words], RXO_ENABLE_PULSE);
        debug!("coupled oscillators armed ({} words)", pattern.words);
    }

    fn latch_coupled(&mut self, words: &[u32], pulse: u32) {
        for (i, &value) in words.iter().enumerate() {
            for tile in Tile::ALL {
                self.write_bl(tile, i, value);
            }
        }
        for value in [pulse, 0] {
            for tile in Tile::ALL {
                self.write_wl(tile, RXO_WL_WORD, value);
            }
        }
    }

    /// Configures one tile's sampler and releases it from reset.
    ///
    /// Out-of-range parameters are clamped with a warning.
    pub fn setup_sampling(&mut self, tile: Tile, clock_divider: u8, mode: u8) {
        let (div, mode) = checked_sampling(clock_divider, mode);

        self.sampling.remove(tile, SamplingControl::SMPL_RSTB);
        self.write_sampling();
        self.sampling.set_half(tile, SamplingControl::config(div, mode));
        self.write_sampling();
        self.bus.write_register(tile.hold_time_addr(), regs::HOLD_TIME);
    }

    /// Configures both samplers identically.
    pub fn setup_sampling_coupled(&mut self, clock_divider: u8, mode: u8) {
        let (div, mode) = checked_sampling(clock_divider, mode);

        for tile in Tile::ALL {
            self.sampling.remove(tile, SamplingControl::SMPL_RSTB);
        }
        self.write_sampling();
        let config = SamplingControl::config(div, mode);
        for tile in Tile::ALL {
            self.sampling.set_half(tile, config);
        }
        self.write_sampling();
        for tile in Tile::ALL {
            self.bus.write_register(tile.hold_time_addr(), regs::HOLD_TIME);
        }
    }

    /// Sets the run bit of each tile in one register write.
    pub fn start_run(&mut self, tiles: &[Tile]) {
        for &tile in tiles {
            self.control.insert(tile, TileControl::RUN);
        }
        self.write_control();
    }

    /// Clears the run bit of each tile in one register write.
    pub fn stop_run(&mut self, tiles: &[Tile]) {
        for &tile in tiles {
            self.control.remove(tile, TileControl::RUN);
        }
        self.write_control();
    }

    /// Reads a tile's sample-done flag.
    ///
    /// # Returns
    ///
    /// `ChipNotResponding` when the status register reads as the floating
    /// bus sentinel, which a live sampler never reports.
    pub fn sample_done(&mut self, tile: Tile) -> Result<bool, MedusaError> {
        let status = self.bus.read_register(tile.done_addr());
        if is_unresponsive(status) {
            warn!("{} sample status read all ones", tile.name());
            return Err(MedusaError::ChipNotResponding);
        }
        Ok(status & 1 != 0)
    }

    /// Reads a tile's elapsed sampling time in sampler clock ticks.
    pub fn sample_time(&mut self, tile: Tile) -> u32 {
        self.bus.read_register(tile.time_addr())
    }

    /// Reads a tile's output-sample registers.
    pub fn read_outputs(&mut self, tile: Tile) -> [u32; DOUT_WORDS] {
        let mut out = [0u32; DOUT_WORDS];
        for (i, word) in out.iter_mut().enumerate() {
            *word = self.bus.read_register(tile.dout_addr(i));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBus;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn reset_sequence_is_repeatable() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.reset(Tile::Left);
        let first = ctrl.bus_mut().writes();
        ctrl.bus_mut().clear();
        ctrl.setup_clause_bias(Tile::Left, 300);
        ctrl.bus_mut().clear();
        ctrl.reset(Tile::Left);
        assert_eq!(ctrl.bus_mut().writes(), first);

        assert_eq!(first.len(), WL_WORDS + BL_WORDS + 2);
        assert_eq!(first[first.len() - 2], (Tile::Left.wl_addr(0), 1));
        assert_eq!(
            first[first.len() - 1],
            (Tile::Left.wl_addr(WL_WORDS - 1), 0x8000_0000)
        );
    }

    #[test]
    fn small_problem_keeps_sections_isolated() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.setup_clause_bias(Tile::Right, 100);
        assert_eq!(ctrl.control().bits(), 0x0018_0018);
        let bus = ctrl.bus_mut();
        // Only the bottom bias line pulses.
        assert!(!bus.writes().contains(&(Tile::Right.wl_addr(0), 0x3)));
        assert!(
            bus.writes()
                .contains(&(Tile::Right.wl_addr(WL_WORDS - 1), 0xC000_0000))
        );
    }

    #[test]
    fn section_switches_follow_clause_count() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.setup_clause_bias(Tile::Left, 200);
        assert_eq!(ctrl.control().bits(), 0x0010_0018);
        ctrl.setup_clause_bias(Tile::Left, 400);
        assert_eq!(ctrl.control().bits(), 0x0000_0018);
        assert!(
            ctrl.bus_mut()
                .writes()
                .contains(&(Tile::Left.wl_addr(0), 0x3))
        );
        ctrl.setup_clause_bias(Tile::Left, 10);
        assert_eq!(ctrl.control().bits(), 0x0018_0018);
    }

    #[test]
    fn disable_skips_oscillator_word() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.disable_all_clauses(Tile::Right);
        let writes = ctrl.bus_mut().writes();
        assert_eq!(writes[0], (Tile::Right.bl_addr(BL_WORDS - 1), 0x0001_0000));
        assert_eq!(writes[1], (Tile::Right.wl_addr(0), 0xFFFF_FFFD));
        assert!(writes.iter().all(|(a, _)| *a != Tile::Right.wl_addr(RXO_WL_WORD)));
        assert_eq!(writes.len(), 1 + 2 * (WL_WORDS - 1) + 1);
        assert_eq!(*writes.last().unwrap(), (Tile::Right.bl_addr(BL_WORDS - 1), 0));
    }

    #[test]
    fn oscillator_patterns_cover_partial_words() {
        let p = OscillatorPattern::new(50, 218);
        assert_eq!(p.words, 4);
        assert_eq!(p.bias[..3], [0xF0F0_F0F0; 3]);
        assert_eq!(p.bias[3], 0x0000_00F0);
        assert_eq!(p.enable[0], 0x0C0C_0C0C);

        let p = OscillatorPattern::new(16, 300);
        assert_eq!(p.words, 1);
        assert_eq!(p.enable[0], 0x3C3C_3C3C);

        let p = OscillatorPattern::new(7, 10);
        assert_eq!(p.bias[0], 0x0000_F0F0);
        let p = OscillatorPattern::new(15, 10);
        assert_eq!(p.bias[0], 0xF0F0_F0F0);
    }

    #[test]
    fn single_oscillator_setup_pulses_reset_then_latches() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.setup_oscillators(Tile::Right, 20, 10);
        let bus = ctrl.bus_mut();
        assert_eq!(bus.writes_to(regs::GLBL_CTRL), vec![0x0018_001A, 0x0018_0018]);
        assert_eq!(
            bus.writes_to(Tile::Right.wl_addr(RXO_WL_WORD)),
            vec![0x04, 0, 0x1B, 0]
        );
        assert_eq!(
            bus.writes_to(Tile::Right.bl_addr(1)),
            vec![0x0000_00F0, 0x0000_000C]
        );
    }

    #[test]
    fn coupled_oscillators_assert_coupling_on_both_halves() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.setup_oscillators_coupled(16, 400);
        assert!(ctrl.control().contains(Tile::Right, TileControl::RXO_MODE));
        assert!(ctrl.control().contains(Tile::Left, TileControl::RXO_MODE));
        let bus = ctrl.bus_mut();
        assert_eq!(bus.writes_to(regs::GLBL_CTRL), vec![0x001A_001A, 0x001C_001C]);
        let pulses: Vec<(u32, u32)> = bus
            .writes()
            .into_iter()
            .filter(|(a, _)| {
                *a == Tile::Right.wl_addr(RXO_WL_WORD) || *a == Tile::Left.wl_addr(RXO_WL_WORD)
            })
            .collect();
        assert_eq!(pulses.len(), 8);
        assert_eq!(pulses[0].0, Tile::Right.wl_addr(RXO_WL_WORD));
        assert_eq!(pulses[1].0, Tile::Left.wl_addr(RXO_WL_WORD));
    }

    #[test]
    fn sampling_writes_only_the_target_half() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.setup_sampling(Tile::Left, 3, 2);
        ctrl.setup_sampling(Tile::Right, 9, 9);
        let bus = ctrl.bus_mut();
        assert_eq!(
            bus.writes_to(regs::SMPL_CTRL),
            vec![0, 0x001B_0000, 0x001B_0000, 0x001B_001F]
        );
        assert_eq!(bus.writes_to(regs::HOLD_TIME_LEFT), vec![100]);
        assert_eq!(bus.writes_to(regs::HOLD_TIME_RIGHT), vec![100]);
    }

    #[test]
    fn run_bits_are_set_and_cleared_together() {
        let mut ctrl = TileController::new(FakeBus::new());
        ctrl.start_run(&Tile::ALL);
        assert_eq!(ctrl.control().bits(), 0x0019_0019);
        ctrl.stop_run(&[Tile::Left]);
        assert_eq!(ctrl.control().bits(), 0x0018_0019);
    }
}
