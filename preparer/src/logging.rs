//! Stderr logger for the `sourceprep` binary.
//!
//! Library code logs through the `log` facade. The binary installs
//! [`StderrLogger`], which prints `[LEVEL] message` lines. Warnings and errors
//! are always shown; `-q` only hides progress messages.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// Returns the maximum level for the given verbosity flags.
///
/// # Examples
///
/// ```
/// use log::LevelFilter;
/// use sourceprep_preparer::logging::level_for;
///
/// assert_eq!(level_for(0, false), LevelFilter::Info);
/// assert_eq!(level_for(1, false), LevelFilter::Debug);
/// assert_eq!(level_for(0, true), LevelFilter::Warn);
/// ```
#[must_use]
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Warn;
    }
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// A [`Log`] implementation writing to standard error.
#[derive(Debug, Clone, Copy)]
pub struct StderrLogger {
    level: LevelFilter,
}

impl StderrLogger {
    /// Creates a logger showing records up to `level`.
    #[must_use]
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Renders a record as a single output line.
    #[must_use]
    pub fn format(record: &Record<'_>) -> String {
        format!("[{}] {}", record.level(), record.args())
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        if writeln!(std::io::stderr().lock(), "{line}").is_err() {
            // Nowhere left to report a failing stderr.
        }
    }

    fn flush(&self) {
        if std::io::stderr().flush().is_err() {
            // As above.
        }
    }
}

/// Installs [`StderrLogger`] as the global logger.
///
/// # Errors
///
/// Returns [`SetLoggerError`] if a logger is already installed.
pub fn init(verbosity: u8, quiet: bool) -> Result<(), SetLoggerError> {
    let level = level_for(verbosity, quiet);
    log::set_boxed_logger(Box::new(StderrLogger::new(level)))?;
    log::set_max_level(level);
    Ok(())
}
