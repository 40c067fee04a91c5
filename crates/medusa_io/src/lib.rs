//! File formats of the MEDUSA test bench.
//!
//! Reads CNF formulas in DIMACS text form and in the packed binary form the
//! controller consumes, persists solver run records as a results stream, and
//! turns recorded output samples back into variable assignments.

/// Assignment decoding and verification.
///
/// Output-sample words carry one bit per variable, least significant bit
/// first. Decoded assignments are checked against the formula they were
/// produced for.
pub mod decode;

/// Packed binary CNF files.
///
/// Loads and saves the little-endian `i16` encoding and converts DIMACS
/// files into it.
pub mod loader;

/// DIMACS CNF parser.
///
/// Parses `p cnf` headers, comment lines, literal streams with `0`
/// terminators and the `%` end marker used by the SATLIB benchmark sets.
pub mod parser;

/// Results stream files.
///
/// A flat sequence of little-endian record words, one record per converged
/// run. Opening a stream for a new batch truncates the previous results.
pub mod results;
