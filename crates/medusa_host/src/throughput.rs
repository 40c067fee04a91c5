use crate::stats::SolveStats;
use anyhow::Result;
use medusa_core::cnf::CnfProblem;
use medusa_core::command::RunMode;
use medusa_core::record::SolverRunRecord;
use medusa_core::solver::{Solver, SolverConfig};
use medusa_core::tile::TileController;
use medusa_hw::{AsicConfig, AsicModel, SimDelay};
use medusa_io::decode::{assignment, verify};
use medusa_io::loader;
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

/// Runs one batch on a fresh chip model.
///
/// Every batch owns its model, solver and record buffer, so batches are
/// independent and can run on any worker.
pub fn model_batch(
    problem: &CnfProblem,
    mode: RunMode,
    runs: usize,
    asic: AsicConfig,
    config: SolverConfig,
) -> Result<Vec<SolverRunRecord>> {
    let tiles = TileController::new(AsicModel::new(asic));
    let mut solver = Solver::new(tiles, SimDelay::new(), config);
    let mut records: Vec<SolverRunRecord> = Vec::with_capacity(runs);
    match mode {
        RunMode::Single(tile) => solver.run_single(tile, problem, runs, &mut records),
        RunMode::Coupled => solver.run_coupled(problem, runs, &mut records),
    }?;
    Ok(records)
}

/// Collects the statistics of a finished batch.
pub fn batch_stats(problem: &CnfProblem, records: &[SolverRunRecord]) -> SolveStats {
    let mut stats = SolveStats::new();
    for record in records {
        let values = assignment(&record.outputs, problem.num_var());
        stats.update(record, verify(problem, &values).is_sat());
    }
    stats
}

/// Benchmarks the solve flow against the chip model.
///
/// Spreads `batches` independent batches over the rayon pool; batch `i`
/// seeds its model with `seed + i`, so a benchmark is reproducible.
/// Batches that give up are counted and reported instead of aborting the
/// whole benchmark.
///
/// # Arguments
///
/// * `problem_path` - Formula file, DIMACS or packed
/// * `mode` - Tiles every batch uses
/// * `batches` - Number of independent batches
/// * `runs` - Runs per batch
/// * `seed` - Base model seed
/// * `stale` - Probability that a model run never reports completion
pub fn run_benchmark(
    problem_path: &Path,
    mode: RunMode,
    batches: usize,
    runs: usize,
    seed: u64,
    stale: f64,
) -> Result<()> {
    println!("Loading problem from {}...", problem_path.display());
    let problem = loader::load_problem(problem_path)?;
    println!(
        "Problem loaded. Vars: {}, Clauses: {}",
        problem.num_var(),
        problem.num_cls()
    );

    println!(
        "Starting Benchmark ({} batches x {} runs, {} mode, Parallel - Rayon)...",
        batches, runs, mode
    );
    let start = Instant::now();

    let (stats, failed) = (0..batches)
        .into_par_iter()
        .map(|i| {
            let asic = AsicConfig {
                seed: seed.wrapping_add(i as u64),
                stale_probability: stale,
                ..AsicConfig::default()
            };
            match model_batch(&problem, mode, runs, asic, SolverConfig::default()) {
                Ok(records) => (batch_stats(&problem, &records), 0usize),
                Err(e) => {
                    log::warn!("batch {} failed: {:#}", i, e);
                    (SolveStats::new(), 1)
                }
            }
        })
        .reduce(
            || (SolveStats::new(), 0),
            |(a, fa), (b, fb)| (a.merge(b), fa + fb),
        );

    let seconds = start.elapsed().as_secs_f64();
    println!("Results");
    println!("Time: {:.4} s", seconds);
    println!("Throughput: {:.2} runs/s", stats.count as f64 / seconds);
    println!("Failed batches: {}/{}", failed, batches);
    stats.print_report();
    Ok(())
}
