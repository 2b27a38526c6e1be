/*
 * Kernel Logger
 *
 * Backend for the `log` crate facade. Records go to the serial port so an
 * attached host console sees them without disturbing the VGA terminals.
 *
 * The maximum level is adjustable at runtime; the keyboard driver maps its
 * debug chords onto raise_level/lower_level.
 */

use log::{LevelFilter, Metadata, Record};

use crate::serial_println;

/// Level ladder walked by raise_level/lower_level.
const LEVELS: [LevelFilter; 6] = [
    LevelFilter::Off,
    LevelFilter::Error,
    LevelFilter::Warn,
    LevelFilter::Info,
    LevelFilter::Debug,
    LevelFilter::Trace,
];

struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            serial_println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the logger. Defaults to the Info level.
pub fn init() {
    match log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info)) {
        Ok(_) => serial_println!("logger initialized"),
        Err(err) => serial_println!("logger init failed: {}", err),
    }
}

pub fn level() -> LevelFilter {
    log::max_level()
}

fn level_index(level: LevelFilter) -> usize {
    LEVELS.iter().position(|&l| l == level).unwrap_or(3)
}

/// Make logging more verbose by one step.
pub fn raise_level() -> LevelFilter {
    let idx = level_index(log::max_level());
    let new = LEVELS[(idx + 1).min(LEVELS.len() - 1)];
    set_level(new)
}

/// Make logging less verbose by one step.
pub fn lower_level() -> LevelFilter {
    let idx = level_index(log::max_level());
    let new = LEVELS[idx.saturating_sub(1)];
    set_level(new)
}

pub fn set_level(level: LevelFilter) -> LevelFilter {
    if level != log::max_level() {
        serial_println!("<<kernel log level set to {}>>", level);
        log::set_max_level(level);
    }
    level
}
