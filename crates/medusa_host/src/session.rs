//! Interactive test-bench session against the chip and core models.
//!
//! Reads command lines from an input stream, feeds them to the same
//! executor the firmware runs and prints every response line. Binary
//! uploads cannot be typed, so the `:upload <file>` directive loads a
//! formula, sends `UPLOAD` and streams its frame words.

use anyhow::{Context, Result};
use embedded_hal::blocking::delay::DelayUs;
use log::debug;
use medusa_core::bench::TestBench;
use medusa_core::bridge::{BridgeConfig, CoreBridge, CorePort};
use medusa_core::bus::RegisterBus;
use medusa_core::command::{Response, ResponseSink, encode_frame};
use medusa_core::solver::{Solver, SolverConfig};
use medusa_core::tile::TileController;
use medusa_hw::{AsicConfig, AsicModel, CoreConfig, CoreModel, SimDelay};
use medusa_io::loader;
use std::io::{BufRead, Write};
use std::path::Path;

/// Response sink writing one line per response.
pub struct LineSink<W: Write> {
    out: W,
    failed: bool,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResponseSink for LineSink<W> {
    fn emit(&mut self, response: Response) {
        if self.failed {
            return;
        }
        if writeln!(self.out, "{}", response).is_err() {
            self.failed = true;
        }
    }
}

/// Executes one session line.
///
/// # Returns
///
/// `false` once the session should end.
fn session_line<B, D, C, W>(
    bench: &mut TestBench<B, D, C>,
    line: &str,
    sink: &mut LineSink<W>,
) -> Result<bool>
where
    B: RegisterBus,
    D: DelayUs<u32>,
    C: CorePort,
    W: Write,
{
    let line = line.trim();
    if line == ":quit" {
        return Ok(false);
    }
    if let Some(path) = line.strip_prefix(":upload") {
        let path = Path::new(path.trim());
        let problem = loader::load_problem(path)?;
        let payload = problem
            .to_packed()
            .with_context(|| format!("{} does not fit the packed encoding", path.display()))?;
        let frame = encode_frame(&payload);
        debug!("uploading {} ({} frame words)", path.display(), frame.len());

        bench.handle_line("UPLOAD", sink);
        for word in frame {
            bench.receive_word(word, sink);
        }
        return Ok(true);
    }
    bench.handle_line(line, sink);
    Ok(true)
}

/// Runs a session over arbitrary input and output streams.
pub fn run_session<R: BufRead, W: Write>(
    input: R,
    output: W,
    asic: AsicConfig,
    core: CoreConfig,
    config: SolverConfig,
) -> Result<W> {
    let solver = Solver::new(
        TileController::new(AsicModel::new(asic)),
        SimDelay::new(),
        config,
    );
    let model = CoreModel::new(core);
    let (rstn, fetch_en, fetch_done) = model.pins();
    let bridge = CoreBridge::new(
        model,
        rstn,
        fetch_en,
        fetch_done,
        SimDelay::new(),
        BridgeConfig::default(),
    );
    let mut bench = TestBench::new(solver, bridge);
    let mut sink = LineSink::new(output);

    for line in input.lines() {
        let line = line?;
        if !session_line(&mut bench, &line, &mut sink)? {
            break;
        }
        sink.out.flush()?;
    }
    Ok(sink.into_inner())
}
