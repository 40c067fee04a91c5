mod clock;
mod generator;
mod hil;
mod session;
mod solve;
mod stats;
mod throughput;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use medusa_common::Tile;
use medusa_core::command::RunMode;
use medusa_core::solver::SolverConfig;
use medusa_hw::{AsicConfig, AsicModel, CoreConfig, server};
use medusa_io::loader;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
struct Cli {
    /// Log verbosity; repeat for more detail (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Right,
    Left,
    Coupled,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Right => RunMode::Single(Tile::Right),
            Mode::Left => RunMode::Single(Tile::Left),
            Mode::Coupled => RunMode::Coupled,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a DIMACS formula into the packed binary form
    Convert {
        input: PathBuf,
        output: PathBuf,
    },
    /// Generate random k-SAT benchmark instances
    Gen {
        #[arg(long, default_value = "bench")]
        dir: PathBuf,
        #[arg(long, default_value_t = 50)]
        vars: usize,
        #[arg(long, default_value_t = 218)]
        clauses: usize,
        #[arg(short, long, default_value_t = 3)]
        k: usize,
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long)]
        planted: bool,
    },
    /// Solve one formula and write the run records
    Solve {
        #[arg(short, long)]
        problem: PathBuf,
        #[arg(short, long, default_value = "results.bin")]
        output: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Mode::Right)]
        mode: Mode,
        #[arg(short, long, default_value_t = 100)]
        runs: usize,
        #[arg(long, default_value_t = 10_000)]
        timeout_us: u32,
        #[arg(long, default_value_t = 1000)]
        max_attempts: u32,
        /// Model server address; the in-process model is used when absent
        #[arg(long)]
        remote: Option<String>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 0.0)]
        stale: f64,
    },
    /// Benchmark parallel batches against the chip model
    Bench {
        #[arg(short, long)]
        problem: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Mode::Right)]
        mode: Mode,
        #[arg(short, long, default_value_t = 64)]
        batches: usize,
        #[arg(short, long, default_value_t = 100)]
        runs: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 0.0)]
        stale: f64,
    },
    /// Decode a results file against its formula
    Results {
        #[arg(short, long)]
        problem: PathBuf,
        #[arg(short, long)]
        results: PathBuf,
    },
    /// Serve the chip model over TCP
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        addr: String,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 0.0)]
        stale: f64,
    },
    /// Interactive command session against the chip and core models
    Session {
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 0)]
        slave_mode: u8,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Convert { input, output } => {
            let problem = loader::convert_dimacs(&input, &output)?;
            println!(
                "Wrote {} ({} vars, {} clauses)",
                output.display(),
                problem.num_var(),
                problem.num_cls()
            );
        }
        Commands::Gen {
            dir,
            vars,
            clauses,
            k,
            count,
            seed,
            planted,
        } => {
            let params = generator::GenParams {
                num_var: vars,
                num_cls: clauses,
                clause_len: k,
                planted,
            };
            generator::generate_instances(&dir, &params, count, seed)?;
        }
        Commands::Solve {
            problem,
            output,
            mode,
            runs,
            timeout_us,
            max_attempts,
            remote,
            seed,
            stale,
        } => {
            let config = SolverConfig {
                timeout_us,
                max_attempts,
                ..SolverConfig::default()
            };
            let target = match remote.as_deref() {
                Some(addr) => solve::Target::Remote(addr),
                None => solve::Target::Model { seed, stale },
            };
            solve::solve_file(&problem, &output, mode.into(), runs, config, target)?;
        }
        Commands::Bench {
            problem,
            mode,
            batches,
            runs,
            seed,
            stale,
        } => {
            throughput::run_benchmark(&problem, mode.into(), batches, runs, seed, stale)?;
        }
        Commands::Results { problem, results } => {
            let problem = loader::load_problem(&problem)?;
            solve::report_results(&problem, &results)?;
        }
        Commands::Serve { addr, seed, stale } => {
            let mut model = AsicModel::new(AsicConfig {
                seed,
                stale_probability: stale,
                ..AsicConfig::default()
            });
            server::serve(addr.as_str(), &mut model)?;
        }
        Commands::Session { seed, slave_mode } => {
            let asic = AsicConfig {
                seed,
                ..AsicConfig::default()
            };
            let core = CoreConfig {
                slave_mode,
                ..CoreConfig::default()
            };
            let stdin = io::stdin();
            session::run_session(
                stdin.lock(),
                io::stdout(),
                asic,
                core,
                SolverConfig::default(),
            )?;
        }
    }
    Ok(())
}
