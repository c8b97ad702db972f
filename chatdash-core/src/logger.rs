//! Forwards the crate's `log` records to a host-provided [`Logger`].

use std::sync::{Arc, OnceLock};

/// A sink for the crate's log records, implemented by the host.
///
/// In the browser build this is the console bridge; the CLI uses `tracing`
/// instead and never installs one.
///
/// # Examples
///
/// ```rust
/// use chatdash_core::logger::{Logger, LogLevel};
///
/// struct Console;
///
/// impl Logger for Console {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{level:?}] {message}");
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Receives one record.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// Normal progress.
    Info,
    /// Potentially harmful situations, such as a fail-open reconciliation.
    Warn,
    /// Errors the dashboard recovered from.
    Error,
}

/// Bridges the `log` facade to the installed [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace records are only forwarded from this crate; dependencies
/// (reqwest, hyper) are too chatty at those levels.
fn should_forward(record: &log::Record) -> bool {
    let is_debug_or_trace = matches!(record.level(), log::Level::Debug | log::Level::Trace);
    let is_ours = record
        .module_path()
        .is_some_and(|module_path| module_path.starts_with("chatdash"));
    !is_debug_or_trace || is_ours
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs `logger` as the destination of every record.
///
/// Only the first call has an effect.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: log::Level, module_path: &'static str) -> bool {
        should_forward(
            &log::Record::builder()
                .level(level)
                .module_path_static(Some(module_path))
                .args(format_args!("message"))
                .build(),
        )
    }

    #[test]
    fn test_dependency_debug_records_are_dropped() {
        assert!(record(log::Level::Debug, "chatdash_core::reconcile"));
        assert!(record(log::Level::Trace, "chatdash_core::prompt::flow"));
        assert!(!record(log::Level::Debug, "hyper_util::client"));
        assert!(!record(log::Level::Trace, "reqwest::connect"));
        assert!(record(log::Level::Warn, "reqwest::connect"));
        assert!(record(log::Level::Error, "hyper_util::client"));
    }

    #[test]
    fn test_levels_map_one_to_one() {
        assert_eq!(log_level(log::Level::Warn), LogLevel::Warn);
        assert_eq!(log_level(log::Level::Trace), LogLevel::Trace);
    }
}
