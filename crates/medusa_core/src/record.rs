//! Solver run records.
//!
//! One record is written per converged run: the output-sample words, the
//! elapsed sampler ticks and the number of stale cycles the run retried. The
//! persisted form is a flat sequence of 32-bit words in that order.

use crate::MedusaError;
use alloc::vec::Vec;
use medusa_common::geometry::{DOUT_WORDS, SAMPLE_CLOCK_HZ};

/// Number of 32-bit words in a persisted record.
pub const RECORD_WORDS: usize = DOUT_WORDS + 2;

/// Converts sampler clock ticks to microseconds.
pub fn ticks_to_us(ticks: u32) -> u64 {
    ticks as u64 * 1_000_000 / SAMPLE_CLOCK_HZ
}

/// Result of one converged solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolverRunRecord {
    /// Output-sample registers of the tile the result was read from.
    pub outputs: [u32; DOUT_WORDS],
    /// Elapsed sampling time in sampler clock ticks.
    pub time_ticks: u32,
    /// Stale cycles retried before convergence; 0 for a first-poll result.
    pub attempts: u32,
}

impl SolverRunRecord {
    /// Elapsed sampling time in microseconds.
    pub fn elapsed_us(&self) -> u64 {
        ticks_to_us(self.time_ticks)
    }

    /// Persisted word layout: outputs, elapsed ticks, attempts.
    pub fn to_words(&self) -> [u32; RECORD_WORDS] {
        let mut words = [0u32; RECORD_WORDS];
        words[..DOUT_WORDS].copy_from_slice(&self.outputs);
        words[DOUT_WORDS] = self.time_ticks;
        words[DOUT_WORDS + 1] = self.attempts;
        words
    }

    /// Rebuilds a record from its persisted words.
    pub fn from_words(words: &[u32; RECORD_WORDS]) -> Self {
        let mut outputs = [0u32; DOUT_WORDS];
        outputs.copy_from_slice(&words[..DOUT_WORDS]);
        Self {
            outputs,
            time_ticks: words[DOUT_WORDS],
            attempts: words[DOUT_WORDS + 1],
        }
    }
}

/// Destination for the records of a run batch.
///
/// A batch starts by clearing the sink, so results of an earlier batch on
/// the same problem are replaced rather than merged.
pub trait ResultSink {
    /// Drops every record persisted so far.
    fn clear(&mut self) -> Result<(), MedusaError>;

    /// Persists one record.
    fn append(&mut self, record: &SolverRunRecord) -> Result<(), MedusaError>;
}

impl ResultSink for Vec<SolverRunRecord> {
    fn clear(&mut self) -> Result<(), MedusaError> {
        Vec::clear(self);
        Ok(())
    }

    fn append(&mut self, record: &SolverRunRecord) -> Result<(), MedusaError> {
        self.push(*record);
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn clear(&mut self) -> Result<(), MedusaError> {
        (**self).clear()
    }

    fn append(&mut self, record: &SolverRunRecord) -> Result<(), MedusaError> {
        (**self).append(record)
    }
}
