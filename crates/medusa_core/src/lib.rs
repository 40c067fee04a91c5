//! Core control logic for the MEDUSA SAT-solver ASIC test bench.
//!
//! This crate turns a CNF formula into register traffic for the dual-tile
//! analog solver: it encodes clauses into word-line/bit-line programming
//! sequences, owns the shadow of the chip's shared control registers, arms
//! the relaxation oscillators and samplers, and runs the bounded-retry solve
//! loop that collects result records. It also drives the companion embedded
//! core over a bit-banged serial link. All modules are `no_std` so the same
//! code runs in the controller firmware and in host-side simulation.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use core::fmt;

/// Bit-banged serial link to the companion embedded core.
///
/// Drives chip select, clock and data-out pins and samples data-in one bit
/// at a time, with clock polarity and phase selected at runtime through
/// `BusTiming`.
pub mod bitbang;

/// Embedded-core bridge: image flashing, mailbox commands, diagnostics.
pub mod bridge;

/// Register bus transport to the ASIC's memory-mapped register space.
///
/// Defines the `RegisterBus` contract used by every higher layer and the
/// hardware SPI implementation built on embedded-hal traits.
pub mod bus;

/// Test-bench command executor.
///
/// Maps parsed host commands onto tile-controller and solver operations and
/// produces the status lines an operator or host script tracks.
pub mod bench;

/// CNF problem model, validation and packed binary codec.
pub mod cnf;

/// Host command protocol: text commands, response lines and the framing of
/// binary uploads.
pub mod command;

/// Shadow copies of the chip's shared, split control registers.
///
/// The global control and sampling control registers pack one 16-bit half
/// per tile. The hardware does not read them back, so the controller keeps
/// the last written value and performs every update as read-modify-write
/// against that shadow.
pub mod control;

/// Clause memory encoder.
///
/// Computes the word line and bit-line words for each clause and issues the
/// programming pulse sequence for a single row.
pub mod encoder;

/// Solver run records and the sink they are persisted through.
pub mod record;

/// Solver run state machine for single-tile and coupled runs.
pub mod solver;

/// Tile controller: reset, clause bias, clause loading, oscillator and
/// sampling setup.
pub mod tile;

#[cfg(test)]
pub(crate) mod testing;

pub use medusa_common::Tile;

/// Error types returned by test-bench operations.
///
/// The register transport itself never fails; these errors are raised by the
/// layers above it once a readback, a capacity check or a timeout tells them
/// something went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MedusaError {
    /// A problem dimension does not fit in the tile's physical memory.
    ///
    /// Raised before any register is written, so an oversized formula never
    /// leaves a tile half programmed.
    CapacityExceeded {
        /// Which dimension overflowed ("variables", "clauses", "clause length").
        what: &'static str,
        /// Requested size.
        requested: usize,
        /// Largest size the hardware supports.
        capacity: usize,
    },

    /// A clause contains the literal 0, which is reserved as a terminator.
    ZeroLiteral {
        /// Index of the offending clause.
        clause: usize,
    },

    /// A literal references a variable beyond the declared variable count.
    LiteralOutOfRange {
        /// Index of the offending clause.
        clause: usize,
        /// The literal as written in the formula.
        literal: i32,
    },

    /// A clause mentions the same variable twice.
    ///
    /// Each variable owns a single presence/polarity pair per row, so a
    /// repeated or complemented variable would be programmed as a
    /// different clause.
    ConflictingLiteral {
        /// Index of the offending clause.
        clause: usize,
        /// The repeated variable.
        var: usize,
    },

    /// The formula declares no variables or no clauses.
    EmptyProblem,

    /// The formula body does not match its header or is truncated.
    MalformedProblem,

    /// The solver re-armed the tile the maximum number of times without a
    /// sane completion.
    ///
    /// The run bit has been cleared before this is returned.
    RetriesExhausted {
        /// Zero-based index of the run inside the batch.
        run: usize,
        /// Runs started, equal to the configured maximum.
        attempts: u32,
    },

    /// The chip answered with the all-ones sentinel of a floating bus.
    ChipNotResponding,

    /// The embedded core did not report ready before a command was issued.
    CoreNotReady {
        /// Status word found in the mailbox.
        status: u32,
    },

    /// The embedded core did not complete a command within the timeout.
    CommandTimeout,

    /// The embedded core reported an error status for a command.
    CommandFailed {
        /// Status word found in the mailbox.
        status: u32,
    },

    /// The embedded core never raised fetch-done after flashing.
    FetchTimeout,

    /// A value read back from the embedded core differs from what was
    /// written.
    ReadbackMismatch {
        /// Byte address of the first differing location.
        address: u32,
        /// Expected value.
        expected: u32,
        /// Value actually read.
        found: u32,
    },

    /// A framed upload did not carry the expected markers or length.
    BadFrame,

    /// The result sink could not persist a record.
    Storage,
}

impl MedusaError {
    /// Token reported to the host in `ERROR:` lines.
    pub fn code(&self) -> &'static str {
        match self {
            MedusaError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            MedusaError::ZeroLiteral { .. } => "ZERO_LITERAL",
            MedusaError::LiteralOutOfRange { .. } => "LITERAL_OUT_OF_RANGE",
            MedusaError::ConflictingLiteral { .. } => "CONFLICTING_LITERAL",
            MedusaError::EmptyProblem => "EMPTY_PROBLEM",
            MedusaError::MalformedProblem => "MALFORMED_PROBLEM",
            MedusaError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            MedusaError::ChipNotResponding => "CHIP_NOT_RESPONDING",
            MedusaError::CoreNotReady { .. } => "CORE_NOT_READY",
            MedusaError::CommandTimeout => "COMMAND_TIMEOUT",
            MedusaError::CommandFailed { .. } => "COMMAND_FAILED",
            MedusaError::FetchTimeout => "FETCH_TIMEOUT",
            MedusaError::ReadbackMismatch { .. } => "READBACK_MISMATCH",
            MedusaError::BadFrame => "BAD_FRAME",
            MedusaError::Storage => "STORAGE",
        }
    }
}

impl fmt::Display for MedusaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MedusaError::CapacityExceeded {
                what,
                requested,
                capacity,
            } => write!(f, "{} {} exceeds tile capacity {}", what, requested, capacity),
            MedusaError::ZeroLiteral { clause } => write!(f, "clause {} contains literal 0", clause),
            MedusaError::LiteralOutOfRange { clause, literal } => {
                write!(f, "clause {} literal {} is out of range", clause, literal)
            }
            MedusaError::ConflictingLiteral { clause, var } => {
                write!(f, "clause {} repeats variable {}", clause, var)
            }
            MedusaError::EmptyProblem => write!(f, "problem has no variables or clauses"),
            MedusaError::MalformedProblem => write!(f, "problem body is malformed"),
            MedusaError::RetriesExhausted { run, attempts } => {
                write!(f, "run {} exhausted {} attempts without converging", run, attempts)
            }
            MedusaError::ChipNotResponding => write!(f, "chip not responding"),
            MedusaError::CoreNotReady { status } => {
                write!(f, "embedded core not ready (status 0x{:X})", status)
            }
            MedusaError::CommandTimeout => write!(f, "embedded core command timed out"),
            MedusaError::CommandFailed { status } => {
                write!(f, "embedded core command failed (status 0x{:X})", status)
            }
            MedusaError::FetchTimeout => write!(f, "fetch done not received"),
            MedusaError::ReadbackMismatch {
                address,
                expected,
                found,
            } => write!(
                f,
                "readback mismatch at 0x{:08X}: expected 0x{:X}, found 0x{:X}",
                address, expected, found
            ),
            MedusaError::BadFrame => write!(f, "malformed upload frame"),
            MedusaError::Storage => write!(f, "result storage failed"),
        }
    }
}

impl core::error::Error for MedusaError {}
