//! Register-level behavioral model of the MEDUSA ASIC.
//!
//! The model decodes the same register traffic the silicon sees. Word-line
//! rising edges latch the current bit-line image into the addressed row, so
//! clause programming, the disconnect sweep and the oscillator pattern
//! pulses all leave the state the array would hold. A rising run bit starts
//! a solve over the connected clause rows of the tile, or of both tiles when
//! they run coupled, and latches the done flag, elapsed time and output
//! samples the controller polls for.

use crate::walk::probsat;
use log::{debug, trace};
use medusa_common::Tile;
use medusa_common::geometry::{
    BL_WORDS, DOUT_WORDS, MAX_CLS, MAX_VAR, RXO_WL_WORD, SECT_CLS, WL_COUNT, WL_WORDS,
};
use medusa_common::regs;
use medusa_core::bus::{ALL_ONES, RegisterBus};
use medusa_core::cnf::Clause;
use medusa_core::control::{GlobalControl, SamplingControl, SamplingRegister, TileControl};
use medusa_core::encoder::{decode_bit_lines, word_line};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Word-line pattern of the oscillator enable pulse.
const RXO_ENABLE_ROWS: u32 = 0x1B;

/// Behavioral parameters of the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsicConfig {
    /// Seed of the model's random source.
    pub seed: u64,
    /// Probability that an attempt never raises its done flag.
    pub stale_probability: f64,
    /// Flips the local search may spend before the attempt gives up.
    pub flip_limit: u64,
    /// Sampler ticks charged per flip.
    pub ticks_per_flip: u32,
    /// Sampler ticks before the first flip.
    pub settle_ticks: u32,
}

impl Default for AsicConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            stale_probability: 0.0,
            flip_limit: 100_000,
            ticks_per_flip: 8,
            settle_ticks: 64,
        }
    }
}

/// Per-tile array and sampler state.
struct TileState {
    word_lines: [u32; WL_WORDS],
    bit_lines: [u32; BL_WORDS],
    rows: Vec<Option<[u32; BL_WORDS]>>,
    oscillators_enabled: bool,
    hold_time: u32,
    done: bool,
    time: u32,
    outputs: [u32; DOUT_WORDS],
}

impl TileState {
    fn new() -> Self {
        Self {
            word_lines: [0; WL_WORDS],
            bit_lines: [0; BL_WORDS],
            rows: vec![None; WL_COUNT],
            oscillators_enabled: false,
            hold_time: 0,
            done: false,
            time: 0,
            outputs: [0; DOUT_WORDS],
        }
    }

    fn write_word_line(&mut self, word: usize, value: u32) {
        let rising = value & !self.word_lines[word];
        self.word_lines[word] = value;
        for bit in 0..32 {
            if rising & (1 << bit) != 0 {
                self.rows[word * 32 + bit] = Some(self.bit_lines);
            }
        }
        if word == RXO_WL_WORD && rising & RXO_ENABLE_ROWS == RXO_ENABLE_ROWS {
            self.oscillators_enabled = true;
        }
    }

    fn clear_sample(&mut self) {
        self.done = false;
        self.time = 0;
        self.outputs = [0; DOUT_WORDS];
    }
}

/// Returns true when clause row `index` is connected through the section
/// switches of `control`.
fn section_connected(control: TileControl, index: usize) -> bool {
    let top_closed = !control.contains(TileControl::CLS_SW_ENB_TOP);
    let bottom_closed = !control.contains(TileControl::CLS_SW_ENB_BOT);
    if index < SECT_CLS {
        true
    } else if index < 3 * SECT_CLS {
        top_closed
    } else {
        top_closed && bottom_closed
    }
}

/// Behavioral model of the dual-tile chip.
pub struct AsicModel {
    config: AsicConfig,
    rng: StdRng,
    control: GlobalControl,
    sampling: SamplingRegister,
    tiles: [TileState; 2],
    disconnected: bool,
    runs_started: usize,
    writes: usize,
}

impl AsicModel {
    /// Creates a chip in its power-on state.
    pub fn new(config: AsicConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            control: GlobalControl::power_on(),
            sampling: SamplingRegister::default(),
            tiles: [TileState::new(), TileState::new()],
            disconnected: false,
            runs_started: 0,
            writes: 0,
        }
    }

    pub fn config(&self) -> &AsicConfig {
        &self.config
    }

    /// Floats the data-out line: every read returns all ones.
    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.disconnected = disconnected;
    }

    /// Current global control register.
    pub fn control(&self) -> GlobalControl {
        self.control
    }

    /// Number of solves started by run-bit rising edges.
    pub fn runs_started(&self) -> usize {
        self.runs_started
    }

    /// Number of register writes received.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn state(&self, tile: Tile) -> &TileState {
        &self.tiles[tile_index(tile)]
    }

    fn state_mut(&mut self, tile: Tile) -> &mut TileState {
        &mut self.tiles[tile_index(tile)]
    }

    /// Clauses a tile would solve over, in clause order.
    ///
    /// Rows that are disconnected, empty, or cut off by an open section
    /// switch are left out.
    pub fn clauses(&self, tile: Tile) -> Vec<Clause> {
        let control = self.control.half(tile);
        let state = self.state(tile);
        (0..MAX_CLS)
            .filter(|&index| section_connected(control, index))
            .filter_map(|index| state.rows[word_line(index)].as_ref())
            .filter_map(decode_bit_lines)
            .filter(|literals| !literals.is_empty())
            .collect()
    }

    /// True when the tile's oscillators and sampler are out of reset.
    fn ready_to_run(&self, tile: Tile) -> bool {
        let control = self.control.half(tile);
        let sampling = self.sampling.half(tile);
        self.state(tile).oscillators_enabled
            && !control.contains(TileControl::RXO_RST)
            && sampling.contains(SamplingControl::SMPL_RSTB)
    }

    /// Runs the local search and converts it into a sample.
    ///
    /// # Returns
    ///
    /// `None` for an attempt whose oscillators never settle.
    fn solve(&mut self, clauses: &[Clause]) -> Option<(u32, [u32; DOUT_WORDS])> {
        if self.rng.gen_bool(self.config.stale_probability.clamp(0.0, 1.0)) {
            return None;
        }
        let outcome = probsat(clauses, MAX_VAR, &mut self.rng, self.config.flip_limit);
        let time = if outcome.solved {
            let spent = outcome.flips.saturating_mul(self.config.ticks_per_flip as u64);
            u32::try_from(spent)
                .unwrap_or(u32::MAX)
                .saturating_add(self.config.settle_ticks)
        } else {
            u32::MAX
        };

        let mut outputs = [0u32; DOUT_WORDS];
        for (i, &value) in outcome.values.iter().enumerate() {
            if value {
                outputs[i / 32] |= 1 << (i % 32);
            }
        }
        debug!(
            "model solve: {} clauses, {} flips, solved={}",
            clauses.len(),
            outcome.flips,
            outcome.solved
        );
        Some((time, outputs))
    }

    fn start_single(&mut self, tile: Tile) {
        self.runs_started += 1;
        if !self.ready_to_run(tile) {
            debug!("{} run with oscillators or sampler held in reset", tile.name());
            return;
        }
        let clauses = self.clauses(tile);
        if let Some((time, outputs)) = self.solve(&clauses) {
            let state = self.state_mut(tile);
            state.done = true;
            state.time = time;
            state.outputs = outputs;
        }
    }

    fn start_coupled(&mut self) {
        self.runs_started += 1;
        if !Tile::ALL.iter().all(|&t| self.ready_to_run(t)) {
            debug!("coupled run with a tile held in reset");
            return;
        }
        let mut clauses = self.clauses(Tile::Right);
        clauses.extend(self.clauses(Tile::Left));
        if let Some((time, outputs)) = self.solve(&clauses) {
            let skew = self.rng.gen_range(0..=self.config.ticks_per_flip.max(1) * 4);
            for (tile, t) in [(Tile::Right, time), (Tile::Left, time.saturating_add(skew))] {
                let state = self.state_mut(tile);
                state.done = true;
                state.time = t;
                state.outputs = outputs;
            }
        }
    }

    fn write_control(&mut self, value: u32) {
        let old = self.control;
        self.control = GlobalControl::from_bits(value);

        let rising: Vec<Tile> = Tile::ALL
            .into_iter()
            .filter(|&t| {
                !old.contains(t, TileControl::RUN) && self.control.contains(t, TileControl::RUN)
            })
            .collect();

        for tile in Tile::ALL {
            if self.control.contains(tile, TileControl::RXO_RST) {
                self.state_mut(tile).oscillators_enabled = false;
            }
            if old.contains(tile, TileControl::RUN) && !self.control.contains(tile, TileControl::RUN) {
                self.state_mut(tile).clear_sample();
            }
        }

        let coupled = Tile::ALL
            .iter()
            .all(|&t| self.control.contains(t, TileControl::RXO_MODE | TileControl::RUN));
        if coupled && rising.len() == 2 {
            self.start_coupled();
        } else {
            for tile in rising {
                self.start_single(tile);
            }
        }
    }
}

fn tile_index(tile: Tile) -> usize {
    match tile {
        Tile::Right => 0,
        Tile::Left => 1,
    }
}

/// Register of a tile's array window.
enum ArrayRegister {
    WordLine(Tile, usize),
    BitLine(Tile, usize),
}

fn decode_array(address: u32) -> Option<ArrayRegister> {
    for tile in Tile::ALL {
        if let Some(word) = (0..WL_WORDS).find(|&w| tile.wl_addr(w) == address) {
            return Some(ArrayRegister::WordLine(tile, word));
        }
        if let Some(word) = (0..BL_WORDS).find(|&w| tile.bl_addr(w) == address) {
            return Some(ArrayRegister::BitLine(tile, word));
        }
    }
    None
}

impl RegisterBus for AsicModel {
    fn write_register(&mut self, address: u32, data: u32) {
        trace!("model W 0x{:08X} <- 0x{:08X}", address, data);
        self.writes += 1;
        match address {
            regs::GLBL_CTRL => self.write_control(data),
            regs::SMPL_CTRL => self.sampling = SamplingRegister::from_bits(data),
            regs::HOLD_TIME_RIGHT => self.state_mut(Tile::Right).hold_time = data,
            regs::HOLD_TIME_LEFT => self.state_mut(Tile::Left).hold_time = data,
            _ => match decode_array(address) {
                Some(ArrayRegister::WordLine(tile, word)) => {
                    self.state_mut(tile).write_word_line(word, data)
                }
                Some(ArrayRegister::BitLine(tile, word)) => {
                    self.state_mut(tile).bit_lines[word] = data
                }
                None => debug!("model write to unmapped 0x{:08X}", address),
            },
        }
    }

    fn read_register(&mut self, address: u32) -> u32 {
        if self.disconnected {
            return ALL_ONES;
        }
        let value = match address {
            regs::GLBL_CTRL => self.control.bits(),
            regs::SMPL_CTRL => self.sampling.bits(),
            regs::HOLD_TIME_RIGHT => self.state(Tile::Right).hold_time,
            regs::HOLD_TIME_LEFT => self.state(Tile::Left).hold_time,
            _ => self.read_tile(address),
        };
        trace!("model R 0x{:08X} -> 0x{:08X}", address, value);
        value
    }
}

impl AsicModel {
    fn read_tile(&self, address: u32) -> u32 {
        for tile in Tile::ALL {
            let state = self.state(tile);
            if address == tile.done_addr() {
                return state.done as u32;
            }
            if address == tile.time_addr() {
                return state.time;
            }
            if let Some(word) = (0..DOUT_WORDS).find(|&w| tile.dout_addr(w) == address) {
                return state.outputs[word];
            }
        }
        match decode_array(address) {
            Some(ArrayRegister::WordLine(tile, word)) => self.state(tile).word_lines[word],
            Some(ArrayRegister::BitLine(tile, word)) => self.state(tile).bit_lines[word],
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medusa_core::tile::TileController;

    fn controller() -> TileController<AsicModel> {
        TileController::new(AsicModel::new(AsicConfig::default()))
    }

    #[test]
    fn programmed_clauses_are_decoded() {
        let mut ctrl = controller();
        let clauses = vec![vec![1, -2], vec![3], vec![1, 2, -4]];
        ctrl.reset(Tile::Right);
        ctrl.setup_clause_bias(Tile::Right, clauses.len());
        ctrl.write_clauses(Tile::Right, &clauses);
        assert_eq!(ctrl.bus_mut().clauses(Tile::Right), clauses);
        assert!(ctrl.bus_mut().clauses(Tile::Left).is_empty());
    }

    #[test]
    fn rewriting_disconnects_stale_rows() {
        let mut ctrl = controller();
        ctrl.reset(Tile::Left);
        ctrl.setup_clause_bias(Tile::Left, 3);
        ctrl.write_clauses(Tile::Left, &[vec![1], vec![2], vec![3]]);
        ctrl.write_clauses(Tile::Left, &[vec![-1]]);
        assert_eq!(ctrl.bus_mut().clauses(Tile::Left), vec![vec![-1]]);
    }

    #[test]
    fn upper_sections_need_closed_switches() {
        let clauses: Vec<Clause> = (0..200).map(|i| vec![(i % 60) + 1]).collect();
        let mut ctrl = controller();
        ctrl.reset(Tile::Right);
        ctrl.write_clauses(Tile::Right, &clauses);
        assert_eq!(ctrl.bus_mut().clauses(Tile::Right).len(), SECT_CLS);

        ctrl.setup_clause_bias(Tile::Right, clauses.len());
        assert_eq!(ctrl.bus_mut().clauses(Tile::Right).len(), 200);
    }

    #[test]
    fn run_without_armed_oscillators_never_completes() {
        let mut ctrl = controller();
        ctrl.write_clauses(Tile::Right, &[vec![1]]);
        ctrl.start_run(&[Tile::Right]);
        assert_eq!(ctrl.sample_done(Tile::Right), Ok(false));
        assert_eq!(ctrl.bus_mut().runs_started(), 1);
    }

    #[test]
    fn armed_run_latches_satisfying_sample() {
        let mut ctrl = controller();
        ctrl.reset(Tile::Right);
        ctrl.setup_clause_bias(Tile::Right, 2);
        ctrl.write_clauses(Tile::Right, &[vec![1, 2], vec![-1]]);
        ctrl.setup_oscillators(Tile::Right, 2, 2);
        ctrl.setup_sampling(Tile::Right, 3, 0);
        ctrl.start_run(&[Tile::Right]);

        assert_eq!(ctrl.sample_done(Tile::Right), Ok(true));
        assert!(ctrl.sample_time(Tile::Right) >= AsicConfig::default().settle_ticks);
        let out = ctrl.read_outputs(Tile::Right);
        assert_eq!(out[0] & 0b11, 0b10);

        ctrl.stop_run(&[Tile::Right]);
        assert_eq!(ctrl.sample_done(Tile::Right), Ok(false));
    }

    #[test]
    fn disconnected_chip_reads_all_ones() {
        let mut model = AsicModel::new(AsicConfig::default());
        assert_eq!(model.read_register(regs::GLBL_CTRL), GlobalControl::power_on().bits());
        model.set_disconnected(true);
        assert_eq!(model.read_register(regs::GLBL_CTRL), ALL_ONES);
    }
}
