//! `log` backend writing to the UART console.
//!
//! Records are printed as `LEVEL ticks [module] message` through the same
//! locked path as protocol lines. Hosts tell the two apart by the level
//! prefix, which no protocol line starts with.

use crate::drivers::delay::ticks;
use log::{LevelFilter, Log, Metadata, Record};

struct UartLogger;

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::console::_print(format_args!(
            "{} {} [{}] {}\n",
            record.level(),
            ticks(),
            record.module_path().unwrap_or("firmware"),
            record.args()
        ));
    }

    fn flush(&self) {}
}

static LOGGER: UartLogger = UartLogger;

/// Installs the UART logger.
///
/// Per-register traffic is logged at trace level and would swamp the
/// command link, so the default ceiling is `Info`.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
