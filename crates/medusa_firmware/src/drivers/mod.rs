//! Board peripheral drivers.
//!
//! Each driver wraps one memory-mapped block of the controller board and
//! exposes it through the embedded-hal traits the test-bench logic is
//! written against.

pub mod delay;
pub mod gpio;
pub mod spi;
