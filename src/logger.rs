//! Writes `log` records to stderr.

use std::str::FromStr;

use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Installs the stderr logger. Only the level changes on later calls.
pub fn init(level: LevelFilter) {
    // another logger may already be installed; records then go there
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Reads a level such as `debug` or `OFF`, falling back to `warn`.
pub fn parse_level(spec: Option<&str>) -> LevelFilter {
    spec.and_then(|spec| LevelFilter::from_str(spec.trim()).ok())
        .unwrap_or(LevelFilter::Warn)
}

/// The level named by `RUST_LOG`.
pub fn level_from_env() -> LevelFilter {
    parse_level(std::env::var("RUST_LOG").ok().as_deref())
}
