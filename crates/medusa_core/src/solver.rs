//! Solver run state machine.
//!
//! A batch programs the clause memory once, then performs `runs` solves.
//! Each solve arms the oscillators and sampler, raises RUN and polls the
//! sample-done flag after every timeout quantum. A run that reports no
//! completion, or a completion time beyond the timeout, is stale: the tile
//! is re-armed and RUN raised again. A run starts at most
//! `SolverConfig::max_attempts` times, so it retries at most one fewer.
//!
//! ```text
//! Idle -> Programmed -> Armed -> Polling -> Converged -> Recorded -> Idle
//!                         ^          |
//!                         +-- StaleRetry
//! ```

use crate::MedusaError;
use crate::bus::RegisterBus;
use crate::cnf::CnfProblem;
use crate::record::{ResultSink, SolverRunRecord, ticks_to_us};
use crate::tile::TileController;
use embedded_hal::blocking::delay::DelayUs;
use log::{debug, info, warn};
use medusa_common::Tile;

/// Solve timing and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverConfig {
    /// Poll quantum and the largest elapsed time accepted as converged.
    pub timeout_us: u32,
    /// Starts per run, the first included, before giving up with
    /// `RetriesExhausted`.
    pub max_attempts: u32,
    /// Sampler clock divider (0 to 3).
    pub clock_divider: u8,
    /// Sampler mode for single-tile runs (0 to 3).
    pub sampling_mode: u8,
    /// Sampler mode for coupled runs (0 to 3).
    pub coupled_sampling_mode: u8,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout_us: 10_000,
            max_attempts: 1000,
            clock_divider: 3,
            sampling_mode: 0,
            coupled_sampling_mode: 2,
        }
    }
}

/// Phase of the solver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No batch in progress.
    Idle,
    /// Clause memory holds the batch's formula.
    Programmed,
    /// Oscillators and sampler configured for the next attempt.
    Armed,
    /// RUN is raised and the done flag is being polled.
    Polling,
    /// The attempt completed within the timeout.
    Converged,
    /// The attempt did not complete; the tile is being re-armed.
    StaleRetry,
    /// The run's record has been persisted.
    Recorded,
}

/// Which tiles a batch drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Single(Tile),
    Coupled,
}

impl Target {
    fn tiles(&self) -> &'static [Tile] {
        match self {
            Target::Single(Tile::Right) => &[Tile::Right],
            Target::Single(Tile::Left) => &[Tile::Left],
            Target::Coupled => &Tile::ALL,
        }
    }
}

/// Drives solve batches over a tile controller.
pub struct Solver<B, D> {
    tiles: TileController<B>,
    delay: D,
    config: SolverConfig,
    state: RunState,
    num_var: usize,
    num_cls: usize,
}

impl<B, D> Solver<B, D>
where
    B: RegisterBus,
    D: DelayUs<u32>,
{
    /// Creates an idle solver.
    pub fn new(tiles: TileController<B>, delay: D, config: SolverConfig) -> Self {
        Self {
            tiles,
            delay,
            config,
            state: RunState::Idle,
            num_var: 0,
            num_cls: 0,
        }
    }

    /// Current state machine phase.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Active configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replaces the configuration for subsequent batches.
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Mutable access to the tile controller.
    pub fn tiles_mut(&mut self) -> &mut TileController<B> {
        &mut self.tiles
    }

    /// Releases the tile controller and delay provider.
    pub fn into_parts(self) -> (TileController<B>, D) {
        (self.tiles, self.delay)
    }

    /// Returns both tiles to their disabled baseline.
    pub fn reset_tiles(&mut self) {
        for tile in Tile::ALL {
            self.tiles.reset(tile);
        }
        self.state = RunState::Idle;
    }

    /// Solves `problem` `runs` times on one tile.
    ///
    /// The problem is validated before any register is written and the sink
    /// is cleared before the first record. Clause memory is programmed once
    /// for the whole batch.
    ///
    /// # Returns
    ///
    /// `RetriesExhausted` when a run never converges within the configured
    /// attempts; records of earlier runs stay in the sink.
    pub fn run_single<S: ResultSink>(
        &mut self,
        tile: Tile,
        problem: &CnfProblem,
        runs: usize,
        sink: &mut S,
    ) -> Result<(), MedusaError> {
        problem.validate_single()?;
        sink.clear()?;

        info!(
            "{} tile: programming {} vars / {} clauses",
            tile.name(),
            problem.num_var(),
            problem.num_cls()
        );
        self.tiles.reset(tile);
        self.tiles.setup_clause_bias(tile, problem.num_cls());
        self.tiles.write_clauses(tile, problem.clauses());
        self.num_var = problem.num_var();
        self.num_cls = problem.num_cls();
        self.state = RunState::Programmed;

        self.run_batch(Target::Single(tile), runs, sink)
    }

    /// Solves `problem` `runs` times with both tiles coupled.
    ///
    /// The first half of the clauses goes to the right tile and the rest to
    /// the left tile; the oscillators of both tiles interact through the
    /// coupling bit.
    pub fn run_coupled<S: ResultSink>(
        &mut self,
        problem: &CnfProblem,
        runs: usize,
        sink: &mut S,
    ) -> Result<(), MedusaError> {
        problem.validate_coupled()?;
        sink.clear()?;

        let (right, left) = problem.split_halves();
        info!(
            "coupled: programming {} vars / {}+{} clauses",
            problem.num_var(),
            right.len(),
            left.len()
        );
        for (tile, clauses) in [(Tile::Right, right), (Tile::Left, left)] {
            self.tiles.reset(tile);
            self.tiles.setup_clause_bias(tile, clauses.len());
            self.tiles.write_clauses(tile, clauses);
        }
        self.num_var = problem.num_var();
        // The oscillator enable width follows the whole coupled formula.
        self.num_cls = problem.num_cls();
        self.state = RunState::Programmed;

        self.run_batch(Target::Coupled, runs, sink)
    }

    fn run_batch<S: ResultSink>(
        &mut self,
        target: Target,
        runs: usize,
        sink: &mut S,
    ) -> Result<(), MedusaError> {
        for run in 0..runs {
            let record = self.run_once(run, target)?;
            sink.append(&record)?;
            self.state = RunState::Recorded;
            debug!(
                "run {} recorded: {} ticks, {} attempts",
                run, record.time_ticks, record.attempts
            );
        }
        self.state = RunState::Idle;
        info!("batch of {} runs complete", runs);
        Ok(())
    }

    fn arm(&mut self, target: Target) {
        let div = self.config.clock_divider;
        match target {
            Target::Single(tile) => {
                self.tiles.setup_oscillators(tile, self.num_var, self.num_cls);
                self.tiles
                    .setup_sampling(tile, div, self.config.sampling_mode);
            }
            Target::Coupled => {
                self.tiles
                    .setup_oscillators_coupled(self.num_var, self.num_cls);
                self.tiles
                    .setup_sampling_coupled(div, self.config.coupled_sampling_mode);
            }
        }
        self.state = RunState::Armed;
    }

    /// Checks for a sane completion.
    ///
    /// # Returns
    ///
    /// The tile to read outputs from and its elapsed ticks, or `None` for a
    /// stale attempt. A status read of all ones is `ChipNotResponding`.
    fn poll(&mut self, target: Target) -> Result<Option<(Tile, u32)>, MedusaError> {
        let (tile, ticks) = match target {
            Target::Single(tile) => {
                if !self.tiles.sample_done(tile)? {
                    return Ok(None);
                }
                (tile, self.tiles.sample_time(tile))
            }
            Target::Coupled => {
                let done = self.tiles.sample_done(Tile::Right)? & self.tiles.sample_done(Tile::Left)?;
                if !done {
                    return Ok(None);
                }
                let right = self.tiles.sample_time(Tile::Right);
                let left = self.tiles.sample_time(Tile::Left);
                if left > right {
                    (Tile::Left, left)
                } else {
                    (Tile::Right, right)
                }
            }
        };

        if ticks_to_us(ticks) > self.config.timeout_us as u64 {
            debug!("{} reported {} ticks, beyond timeout", tile.name(), ticks);
            return Ok(None);
        }
        Ok(Some((tile, ticks)))
    }

    /// Runs one solve, re-arming after every stale poll.
    ///
    /// The record counts the retries used, so a run that converges on its
    /// first poll records zero. At most `max_attempts` runs are started.
    fn run_once(&mut self, run: usize, target: Target) -> Result<SolverRunRecord, MedusaError> {
        let tiles = target.tiles();
        let mut attempts = 0u32;

        self.arm(target);
        self.tiles.start_run(tiles);
        self.state = RunState::Polling;

        loop {
            self.delay.delay_us(self.config.timeout_us);

            let polled = match self.poll(target) {
                Ok(polled) => polled,
                Err(e) => {
                    self.tiles.stop_run(tiles);
                    self.state = RunState::Idle;
                    warn!("run {} lost the chip after {} retries", run, attempts);
                    return Err(e);
                }
            };
            if let Some((tile, ticks)) = polled {
                self.state = RunState::Converged;
                let outputs = self.tiles.read_outputs(tile);
                self.tiles.stop_run(tiles);
                return Ok(SolverRunRecord {
                    outputs,
                    time_ticks: ticks,
                    attempts,
                });
            }

            self.state = RunState::StaleRetry;
            if attempts + 1 >= self.config.max_attempts {
                self.tiles.stop_run(tiles);
                self.state = RunState::Idle;
                let started = attempts + 1;
                warn!("run {} gave up after {} attempts", run, started);
                return Err(MedusaError::RetriesExhausted {
                    run,
                    attempts: started,
                });
            }

            attempts += 1;
            warn!("run {} stale, re-arming (retry {})", run, attempts);
            self.tiles.stop_run(tiles);
            self.arm(target);
            self.tiles.start_run(tiles);
            self.state = RunState::Polling;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::TileControl;
    use crate::bus::ALL_ONES;
    use crate::testing::{FakeBus, NoDelay, Op};
    use alloc::vec;
    use alloc::vec::Vec;
    use medusa_common::geometry::{BL_WORDS, MAX_CLS};
    use medusa_common::regs;

    fn solver(bus: FakeBus, config: SolverConfig) -> Solver<FakeBus, NoDelay> {
        Solver::new(TileController::new(bus), NoDelay, config)
    }

    fn problem(num_var: usize, clauses: &[&[i32]]) -> CnfProblem {
        CnfProblem::new(num_var, clauses.iter().map(|c| c.to_vec()).collect())
    }

    /// Number of control writes that raised RUN on `tile`.
    fn run_edges(bus: &FakeBus, tile: Tile) -> usize {
        let mut previous = false;
        let mut edges = 0;
        for value in bus.writes_to(regs::GLBL_CTRL) {
            let run = (value >> tile.half_shift()) & TileControl::RUN.bits() as u32 != 0;
            if run && !previous {
                edges += 1;
            }
            previous = run;
        }
        edges
    }

    #[test]
    fn single_clause_run_programs_presence_and_records() {
        let mut bus = FakeBus::new();
        bus.set(Tile::Right.done_addr(), 1);
        bus.set(Tile::Right.time_addr(), 500);
        bus.set(Tile::Right.dout_addr(0), 0x1);
        let mut s = solver(bus, SolverConfig::default());
        let mut records = Vec::new();

        s.run_single(Tile::Right, &problem(1, &[&[1]]), 1, &mut records)
            .expect("run converges");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outputs, [1, 0]);
        assert_eq!(records[0].time_ticks, 500);
        assert_eq!(records[0].attempts, 0);
        assert_eq!(s.state(), RunState::Idle);

        let writes = s.tiles_mut().bus_mut().writes();
        let bl0 = Tile::Right.bl_addr(0);
        let wl0 = Tile::Right.wl_addr(0);
        let at = writes
            .iter()
            .position(|w| *w == (bl0, 0b10))
            .expect("presence bit driven");
        assert_eq!(writes[at + 1], (Tile::Right.bl_addr(BL_WORDS - 1), 0));
        assert_eq!(writes[at + 2], (wl0, 0x1 | 1 << 2));
        assert_eq!(writes[at + 3], (wl0, 0x1));
    }

    #[test]
    fn oversized_problem_is_rejected_before_any_access() {
        let clauses = vec![vec![1]; MAX_CLS + 1];
        let p = CnfProblem::new(1, clauses);
        let mut s = solver(FakeBus::new(), SolverConfig::default());
        let mut records = vec![SolverRunRecord::default()];

        let err = s.run_single(Tile::Left, &p, 1, &mut records);
        assert!(matches!(err, Err(MedusaError::CapacityExceeded { .. })));
        assert!(s.tiles_mut().bus_mut().ops.is_empty());
        // Earlier results are left alone when nothing was run.
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn attempts_grow_by_one_per_stale_cycle() {
        let mut bus = FakeBus::new();
        bus.script(Tile::Right.done_addr(), &[0, 0, 1]);
        bus.set(Tile::Right.time_addr(), 100);
        let mut s = solver(bus, SolverConfig::default());
        let mut records = Vec::new();

        s.run_single(Tile::Right, &problem(2, &[&[1, -2]]), 1, &mut records)
            .expect("run converges");

        assert_eq!(records[0].attempts, 2);
        assert_eq!(run_edges(s.tiles_mut().bus_mut(), Tile::Right), 3);
    }

    #[test]
    fn late_completion_counts_as_stale() {
        let mut bus = FakeBus::new();
        bus.set(Tile::Left.done_addr(), 1);
        // 2 000 000 ticks is about 17 ms, beyond the 10 ms timeout.
        bus.script(Tile::Left.time_addr(), &[2_000_000, 40]);
        let mut s = solver(bus, SolverConfig::default());
        let mut records = Vec::new();

        s.run_single(Tile::Left, &problem(1, &[&[1]]), 1, &mut records)
            .expect("run converges");
        assert_eq!(records[0].attempts, 1);
        assert_eq!(records[0].time_ticks, 40);
    }

    #[test]
    fn retries_are_bounded_and_leave_run_cleared() {
        let config = SolverConfig {
            max_attempts: 4,
            ..SolverConfig::default()
        };
        let mut s = solver(FakeBus::new(), config);
        let mut records = Vec::new();

        let err = s.run_single(Tile::Right, &problem(1, &[&[1]]), 2, &mut records);
        assert_eq!(err, Err(MedusaError::RetriesExhausted { run: 0, attempts: 4 }));
        assert!(records.is_empty());
        assert!(!s.tiles_mut().control().contains(Tile::Right, TileControl::RUN));

        let bus = s.tiles_mut().bus_mut();
        assert_eq!(run_edges(bus, Tile::Right), 4);
        let last = *bus.writes_to(regs::GLBL_CTRL).last().expect("control written");
        assert_eq!(last & TileControl::RUN.bits() as u32, 0);
    }

    #[test]
    fn chip_lost_mid_run_is_not_a_stale_cycle() {
        let mut bus = FakeBus::new();
        bus.set(Tile::Right.done_addr(), ALL_ONES);
        let mut s = solver(bus, SolverConfig::default());
        let mut records = Vec::new();

        let err = s.run_single(Tile::Right, &problem(1, &[&[1]]), 1, &mut records);
        assert_eq!(err, Err(MedusaError::ChipNotResponding));
        assert!(records.is_empty());
        assert_eq!(s.state(), RunState::Idle);
        assert!(!s.tiles_mut().control().contains(Tile::Right, TileControl::RUN));
        // No re-arm after the sentinel read.
        assert_eq!(run_edges(s.tiles_mut().bus_mut(), Tile::Right), 1);
    }

    #[test]
    fn coupled_chip_loss_on_either_tile_stops_the_batch() {
        let mut bus = FakeBus::new();
        bus.set(Tile::Right.done_addr(), 1);
        bus.script(Tile::Left.done_addr(), &[0, ALL_ONES]);
        let mut s = solver(bus, SolverConfig::default());
        let mut records = Vec::new();

        let err = s.run_coupled(&problem(2, &[&[1], &[2]]), 1, &mut records);
        assert_eq!(err, Err(MedusaError::ChipNotResponding));
        assert_eq!(run_edges(s.tiles_mut().bus_mut(), Tile::Left), 2);
    }

    #[test]
    fn every_run_of_a_batch_is_recorded() {
        let mut bus = FakeBus::new();
        bus.set(Tile::Right.done_addr(), 1);
        bus.script(Tile::Right.time_addr(), &[10, 20, 30]);
        let mut s = solver(bus, SolverConfig::default());
        let mut records = vec![SolverRunRecord::default(); 5];

        s.run_single(Tile::Right, &problem(1, &[&[1]]), 3, &mut records)
            .expect("batch converges");
        let times: Vec<u32> = records.iter().map(|r| r.time_ticks).collect();
        assert_eq!(times, vec![10, 20, 30]);

        // Clause memory is programmed once per batch.
        let bus = s.tiles_mut().bus_mut();
        let row_pulses = bus
            .writes_to(Tile::Right.wl_addr(0))
            .iter()
            .filter(|&&v| v == 0x1 | 1 << 2)
            .count();
        assert_eq!(row_pulses, 1);
    }

    fn coupled_reads(t_right: u32, t_left: u32) -> (SolverRunRecord, Vec<u32>) {
        let mut bus = FakeBus::new();
        for (tile, t, out) in [(Tile::Right, t_right, 0xAAAA), (Tile::Left, t_left, 0xBBBB)] {
            bus.set(tile.done_addr(), 1);
            bus.set(tile.time_addr(), t);
            bus.set(tile.dout_addr(0), out);
        }
        let mut s = solver(bus, SolverConfig::default());
        let mut records = Vec::new();
        s.run_coupled(&problem(2, &[&[1], &[-2], &[1, 2]]), 1, &mut records)
            .expect("coupled run converges");
        let reads = s
            .tiles_mut()
            .bus_mut()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Read(a) => Some(*a),
                Op::Write(..) => None,
            })
            .collect();
        (records[0], reads)
    }

    #[test]
    fn coupled_run_reads_the_slower_tile() {
        let (record, reads) = coupled_reads(100, 50);
        assert_eq!(record.outputs[0], 0xAAAA);
        assert_eq!(record.time_ticks, 100);
        assert!(reads.contains(&Tile::Right.dout_addr(0)));
        assert!(!reads.contains(&Tile::Left.dout_addr(0)));

        let (record, reads) = coupled_reads(50, 100);
        assert_eq!(record.outputs[0], 0xBBBB);
        assert_eq!(record.time_ticks, 100);
        assert!(reads.contains(&Tile::Left.dout_addr(0)));
        assert!(!reads.contains(&Tile::Right.dout_addr(0)));

        // Ties go to the right tile.
        let (record, _) = coupled_reads(70, 70);
        assert_eq!(record.outputs[0], 0xAAAA);
    }

    #[test]
    fn coupled_run_needs_both_done_flags() {
        let mut bus = FakeBus::new();
        bus.set(Tile::Right.done_addr(), 1);
        bus.script(Tile::Left.done_addr(), &[0, 1]);
        let mut s = solver(bus, SolverConfig::default());
        let mut records = Vec::new();
        s.run_coupled(&problem(2, &[&[1], &[2]]), 1, &mut records)
            .expect("coupled run converges");
        assert_eq!(records[0].attempts, 1);
        assert!(s.tiles_mut().control().contains(Tile::Left, TileControl::RXO_MODE));
    }

    #[test]
    fn coupled_split_programs_first_half_right() {
        let mut s = solver(FakeBus::new(), SolverConfig::default());
        s.tiles_mut().bus_mut().set(Tile::Right.done_addr(), 1);
        s.tiles_mut().bus_mut().set(Tile::Left.done_addr(), 1);
        let mut records = Vec::new();
        s.run_coupled(&problem(3, &[&[1], &[2], &[-3]]), 1, &mut records)
            .expect("coupled run converges");

        let bus = s.tiles_mut().bus_mut();
        // Clause [1] on the right tile, [2] and [-3] on the left.
        assert!(bus.writes_to(Tile::Right.bl_addr(0)).contains(&0b10));
        assert!(bus.writes_to(Tile::Left.bl_addr(0)).contains(&0b1000));
        assert!(bus.writes_to(Tile::Left.bl_addr(0)).contains(&0b11_0000));
    }

    #[test]
    fn coupled_enable_width_follows_total_clause_count() {
        let mut s = solver(FakeBus::new(), SolverConfig::default());
        for tile in Tile::ALL {
            s.tiles_mut().bus_mut().set(tile.done_addr(), 1);
        }
        let clauses: Vec<Vec<i32>> = (0..300).map(|i| vec![(i % 16) + 1]).collect();
        let p = CnfProblem::new(16, clauses);
        let mut records = Vec::new();
        s.run_coupled(&p, 1, &mut records)
            .expect("coupled run converges");

        // 150 clauses per tile, 300 in the formula: the wide enable is used.
        let bus = s.tiles_mut().bus_mut();
        for tile in Tile::ALL {
            let bl0 = bus.writes_to(tile.bl_addr(0));
            assert!(bl0.contains(&0x3C3C_3C3C));
            assert!(!bl0.contains(&0x0C0C_0C0C));
        }
    }
}
