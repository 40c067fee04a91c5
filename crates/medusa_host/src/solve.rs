//! Single-batch solve driver.
//!
//! Programs a formula, runs a batch, streams the records into a results
//! file and decodes every run's assignment against the formula. The chip
//! is either an in-process model or a model server reached over TCP.

use crate::clock::StdDelay;
use crate::hil::TcpRegisterBus;
use crate::stats::SolveStats;
use anyhow::{Context, Result, bail};
use embedded_hal::blocking::delay::DelayUs;
use log::info;
use medusa_core::bus::{RegisterBus, check_presence};
use medusa_core::cnf::CnfProblem;
use medusa_core::command::RunMode;
use medusa_core::record::SolverRunRecord;
use medusa_core::solver::{Solver, SolverConfig};
use medusa_core::tile::TileController;
use medusa_hw::{AsicConfig, AsicModel, SimDelay};
use medusa_io::decode::{assignment, verify};
use medusa_io::loader;
use medusa_io::results::{ResultsFile, read_results};
use std::path::Path;

/// Where the solve batch runs.
pub enum Target<'a> {
    /// In-process chip model with the given seed.
    Model { seed: u64, stale: f64 },
    /// Model server at "host:port".
    Remote(&'a str),
}

/// Runs a batch on an already constructed register bus.
///
/// The chip is checked first so a missing board fails fast instead of
/// burning the whole retry budget on floating-bus reads.
fn run_on<B, D>(
    bus: B,
    delay: D,
    problem: &CnfProblem,
    mode: RunMode,
    runs: usize,
    config: SolverConfig,
    output: &Path,
) -> Result<()>
where
    B: RegisterBus,
    D: DelayUs<u32>,
{
    let mut tiles = TileController::new(bus);
    let id = check_presence(tiles.bus_mut())?;
    info!("chip answered presence check with 0x{:08X}", id);

    let mut solver = Solver::new(tiles, delay, config);
    let mut sink = ResultsFile::create(output)?;
    match mode {
        RunMode::Single(tile) => solver.run_single(tile, problem, runs, &mut sink),
        RunMode::Coupled => solver.run_coupled(problem, runs, &mut sink),
    }
    .with_context(|| format!("{} batch failed after {} records", mode, sink.len()))?;
    Ok(())
}

/// Solves a formula file and writes the records to `output`.
///
/// # Arguments
///
/// * `problem_path` - Formula file, DIMACS or packed
/// * `output` - Results file, truncated before the batch starts
/// * `mode` - Tiles the batch uses
/// * `runs` - Number of converged runs to collect
/// * `config` - Timeout and retry policy
/// * `target` - Chip model or model server
///
/// # Returns
///
/// Ok(()) when every run converged, or an error if loading, validation,
/// the batch itself or file I/O fails. Records of runs converged before a
/// failure remain in `output`.
pub fn solve_file(
    problem_path: &Path,
    output: &Path,
    mode: RunMode,
    runs: usize,
    config: SolverConfig,
    target: Target<'_>,
) -> Result<()> {
    let problem = loader::load_problem(problem_path)?;
    println!(
        "Solving {} ({} vars, {} clauses) in {} mode, {} runs",
        problem_path.display(),
        problem.num_var(),
        problem.num_cls(),
        mode,
        runs
    );

    match target {
        Target::Model { seed, stale } => {
            let model = AsicModel::new(AsicConfig {
                seed,
                stale_probability: stale,
                ..AsicConfig::default()
            });
            run_on(model, SimDelay::new(), &problem, mode, runs, config, output)?;
        }
        Target::Remote(addr) => {
            let bus = TcpRegisterBus::connect(addr)?;
            run_on(bus, StdDelay, &problem, mode, runs, config, output)?;
        }
    }

    report_results(&problem, output)
}

/// Decodes a results file against its formula and prints one line per run
/// followed by the summary.
pub fn report_results(problem: &CnfProblem, results: &Path) -> Result<()> {
    let records = read_results(results)?;
    if records.is_empty() {
        bail!("{} holds no records", results.display());
    }

    let mut stats = SolveStats::new();
    for (i, record) in records.iter().enumerate() {
        let sat = print_record(problem, i, record);
        stats.update(record, sat);
    }
    stats.print_report();
    Ok(())
}

fn print_record(problem: &CnfProblem, index: usize, record: &SolverRunRecord) -> bool {
    let values = assignment(&record.outputs, problem.num_var());
    let verdict = verify(problem, &values);
    println!(
        "run {:4}: {:8} us, {:4} retries, {}/{} clauses {}",
        index,
        record.elapsed_us(),
        record.attempts,
        verdict.satisfied,
        verdict.total,
        if verdict.is_sat() { "SAT" } else { "" }
    );
    verdict.is_sat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use medusa_common::Tile;
    use medusa_io::parser::parse_dimacs;
    use std::fs;

    const UF: &str = "p cnf 6 5\n1 -2 0\n2 3 0\n-3 4 0\n4 5 -6 0\n6 1 0\n";

    #[test]
    fn model_solve_writes_every_run() {
        let dir = tempfile::tempdir().unwrap();
        let cnf = dir.path().join("small.cnf");
        let out = dir.path().join("small.bin");
        fs::write(&cnf, UF).unwrap();

        solve_file(
            &cnf,
            &out,
            RunMode::Single(Tile::Left),
            3,
            SolverConfig::default(),
            Target::Model { seed: 2, stale: 0.0 },
        )
        .unwrap();

        let records = read_results(&out).unwrap();
        assert_eq!(records.len(), 3);
        let problem = parse_dimacs(UF).unwrap();
        for r in &records {
            assert!(verify(&problem, &assignment(&r.outputs, 6)).is_sat());
        }
    }

    #[test]
    fn disconnected_chip_fails_before_programming() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("none.bin");
        let problem = parse_dimacs(UF).unwrap();
        let mut model = AsicModel::new(AsicConfig::default());
        model.set_disconnected(true);

        let result = run_on(
            model,
            SimDelay::new(),
            &problem,
            RunMode::Coupled,
            1,
            SolverConfig::default(),
            &out,
        );
        assert!(result.is_err());
        assert!(!out.exists());
    }

    #[test]
    fn empty_results_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.bin");
        fs::write(&out, []).unwrap();
        let problem = parse_dimacs(UF).unwrap();
        assert!(report_results(&problem, &out).is_err());
    }
}
