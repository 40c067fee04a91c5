//! Test-bench command executor.
//!
//! Sits between the serial link and the hardware: each parsed command is
//! turned into tile, solver or embedded-core operations, and every phase
//! transition is reported as a status line. The bench refuses new work
//! while an upload frame is pending.

use crate::MedusaError;
use crate::bridge::CorePort;
use crate::bus::{RegisterBus, check_presence};
use crate::cnf::CnfProblem;
use crate::command::{Command, FrameReceiver, ParseError, Response, ResponseSink, RunMode};
use crate::record::SolverRunRecord;
use crate::solver::Solver;
use alloc::vec::Vec;
use core::fmt;
use embedded_hal::blocking::delay::DelayUs;
use log::{info, warn};
use medusa_common::core_map;

/// Externally visible state of the bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchStatus {
    Ready,
    Busy,
    Error,
}

impl fmt::Display for BenchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BenchStatus::Ready => "READY",
            BenchStatus::Busy => "BUSY",
            BenchStatus::Error => "ERROR",
        })
    }
}

/// Command executor owning the solver and the embedded-core port.
pub struct TestBench<B, D, C> {
    solver: Solver<B, D>,
    core: C,
    status: BenchStatus,
    upload: Option<FrameReceiver>,
    payload: Option<Vec<u8>>,
    results: Vec<SolverRunRecord>,
}

impl<B, D, C> TestBench<B, D, C>
where
    B: RegisterBus,
    D: DelayUs<u32>,
    C: CorePort,
{
    pub fn new(solver: Solver<B, D>, core: C) -> Self {
        Self {
            solver,
            core,
            status: BenchStatus::Ready,
            upload: None,
            payload: None,
            results: Vec::new(),
        }
    }

    pub fn status(&self) -> BenchStatus {
        self.status
    }

    pub fn solver_mut(&mut self) -> &mut Solver<B, D> {
        &mut self.solver
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    /// Records of the last `RUN_TEST` batch.
    pub fn results(&self) -> &[SolverRunRecord] {
        &self.results
    }

    /// True while an upload frame is being received.
    pub fn awaiting_upload(&self) -> bool {
        self.upload.is_some()
    }

    /// Parses and executes one command line.
    pub fn handle_line<O: ResponseSink>(&mut self, line: &str, out: &mut O) {
        match Command::parse(line) {
            Ok(command) => self.handle(command, out),
            Err(ParseError::Empty) => {}
            Err(ParseError::Unknown) => out.emit(Response::UnknownCommand),
            Err(ParseError::InvalidArgument) => out.emit(Response::Error("INVALID_ARGUMENT")),
        }
    }

    /// Executes one command.
    pub fn handle<O: ResponseSink>(&mut self, command: Command, out: &mut O) {
        if self.awaiting_upload() && !command.allowed_while_busy() {
            out.emit(Response::Busy);
            return;
        }

        match command {
            Command::Ping => out.emit(Response::Pong),
            Command::Status => match check_presence(self.solver.tiles_mut().bus_mut()) {
                Ok(_) => out.emit(Response::Status(self.status)),
                Err(_) => out.emit(Response::ChipNotResponding),
            },
            Command::HealthCheck => {
                out.emit(Response::Ack(command.name()));
                out.emit(Response::HealthOk);
                out.emit(Response::Chip);
                out.emit(Response::Version);
                let ok = check_presence(self.solver.tiles_mut().bus_mut()).is_ok();
                out.emit(Response::HealthCheckComplete(ok));
            }
            Command::Reset => {
                self.solver.reset_tiles();
                self.upload = None;
                self.status = BenchStatus::Ready;
                out.emit(Response::Ack(command.name()));
                out.emit(Response::Status(self.status));
            }
            Command::Upload => {
                self.upload = Some(FrameReceiver::new());
                self.status = BenchStatus::Busy;
                out.emit(Response::Ack(command.name()));
            }
            Command::RunTest { runs, mode } => self.run_test(runs as usize, mode, out),
            Command::Flash => {
                let Some(image) = self.payload.as_deref() else {
                    out.emit(Response::Error("NO_PAYLOAD"));
                    return;
                };
                let flashed = self
                    .core
                    .flash_image(image)
                    .and_then(|_| self.core.verify_image(image));
                match flashed {
                    Ok(()) => out.emit(Response::Ack(command.name())),
                    Err(e) => out.emit(e.into()),
                }
            }
            Command::PingPulp => {
                match self.core.send_command(core_map::CMD_ECHO, core_map::SWEEP_PATTERN) {
                    Ok(v) if v == core_map::SWEEP_PATTERN => out.emit(Response::Value(v)),
                    Ok(v) => out.emit(
                        MedusaError::ReadbackMismatch {
                            address: core_map::COMM_RESULT,
                            expected: core_map::SWEEP_PATTERN,
                            found: v,
                        }
                        .into(),
                    ),
                    Err(e) => out.emit(e.into()),
                }
            }
            Command::AddOne(n) => self.core_command(core_map::CMD_ADD_ONE, n, out),
            Command::Square(n) => self.core_command(core_map::CMD_SQUARE, n, out),
            Command::Read(address) => out.emit(Response::Value(self.core.read_memory(address))),
            Command::Write(address, value) => {
                self.core.write_memory(address, value);
                out.emit(Response::Ack(command.name()));
            }
            Command::Loopback => out.emit(Response::Loopback(self.core.test_loopback())),
            Command::SpiModes => {
                let mode = self.core.sweep_spi_modes().map(|t| t.mode());
                out.emit(Response::SpiMode(mode));
            }
        }
    }

    /// Feeds one word of a pending upload frame.
    pub fn receive_word<O: ResponseSink>(&mut self, word: u32, out: &mut O) {
        let Some(receiver) = self.upload.as_mut() else {
            return;
        };
        match receiver.push(word) {
            Ok(None) => {}
            Ok(Some(payload)) => {
                info!("upload complete: {} bytes", payload.len());
                out.emit(Response::Uploaded(payload.len()));
                self.payload = Some(payload);
                self.upload = None;
                self.status = BenchStatus::Ready;
            }
            Err(e) => {
                warn!("upload aborted: {}", e);
                out.emit(e.into());
                self.upload = None;
                self.status = BenchStatus::Ready;
            }
        }
    }

    fn core_command<O: ResponseSink>(&mut self, command: u32, operand: u32, out: &mut O) {
        match self.core.send_command(command, operand) {
            Ok(v) => out.emit(Response::Value(v)),
            Err(e) => out.emit(e.into()),
        }
    }

    fn run_test<O: ResponseSink>(&mut self, runs: usize, mode: RunMode, out: &mut O) {
        let Some(payload) = self.payload.as_deref() else {
            out.emit(Response::Error("NO_PROBLEM"));
            return;
        };
        let problem = match CnfProblem::from_packed(payload) {
            Ok(p) => p,
            Err(e) => {
                out.emit(e.into());
                return;
            }
        };
        if check_presence(self.solver.tiles_mut().bus_mut()).is_err() {
            self.status = BenchStatus::Error;
            out.emit(Response::ChipNotResponding);
            return;
        }

        out.emit(Response::Ack("RUN_TEST"));
        self.status = BenchStatus::Busy;
        out.emit(Response::Status(self.status));

        let outcome = match mode {
            RunMode::Single(tile) => {
                self.solver
                    .run_single(tile, &problem, runs, &mut self.results)
            }
            RunMode::Coupled => self.solver.run_coupled(&problem, runs, &mut self.results),
        };

        for record in &self.results {
            out.emit(Response::Record(*record));
        }
        match outcome {
            Ok(()) => self.status = BenchStatus::Ready,
            Err(e) => {
                warn!("run test failed: {}", e);
                out.emit(e.into());
                self.status = BenchStatus::Error;
            }
        }
        out.emit(Response::Status(self.status));
    }
}
