//! Behavioral hardware models for the MEDUSA test bench.
//!
//! Stands in for the silicon when no board is attached: a register-level
//! model of the dual-tile SAT-solver ASIC, a model of the companion embedded
//! core behind its serial link and control pins, and a TCP server exposing
//! the ASIC model to hardware-in-the-loop clients. The models speak the same
//! `RegisterBus` and `CoreLink` contracts as the real transports, so the
//! controller logic runs against them unchanged.

/// Register-level model of the SAT-solver ASIC.
///
/// Latches word-line and bit-line programming into per-row clause images,
/// honours the row disconnect bit and the section switches, and answers a
/// rising run bit with a local-search solve that fills the sampler
/// registers.
pub mod asic;

/// Non-sleeping delay provider that accumulates simulated time.
pub mod clock;

/// Model of the embedded core: serial slave, memory, fetch pins and the
/// mailbox firmware.
pub mod core_model;

/// TCP request server in front of a register bus.
pub mod server;

/// ProbSAT local search used by the ASIC model to settle a formula.
pub mod walk;

pub use asic::{AsicConfig, AsicModel};
pub use clock::SimDelay;
pub use core_model::{CoreConfig, CoreModel};
