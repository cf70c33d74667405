//! Named loggers that prefix every message with the active tracking record.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    config::{self, Level},
    context,
};

static LOGGERS: OnceLock<DashMap<String, Arc<NamedLogger>>> = OnceLock::new();

fn registry() -> &'static DashMap<String, Arc<NamedLogger>> {
    LOGGERS.get_or_init(DashMap::new)
}

/// Returns the logger of channel `name`, creating it on first use.
///
/// Every caller, concurrent ones included, gets the same instance.
pub fn get_logger(name: &str) -> Arc<NamedLogger> {
    if let Some(logger) = registry().get(name) {
        return Arc::clone(logger.value());
    }

    let (logger, created) = match registry().entry(name.to_owned()) {
        Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
        Entry::Vacant(entry) => {
            let logger = Arc::new(NamedLogger::new(name));
            entry.insert(Arc::clone(&logger));
            (logger, true)
        }
    };

    if created {
        logger.info(format_args!(
            "Logger '{name}' created, level {}",
            logger.threshold()
        ));
    }
    logger
}

/// Per-channel logging handle.
///
/// Messages go out as `tracing` events carrying a `category` field. `fatal`
/// is emitted at `ERROR` with `severity = "FATAL"`.
///
/// The threshold is looked up in the active configuration on every call, so a
/// logger created before [`crate::setup::setup`] follows the file once it is
/// installed.
#[derive(Debug)]
pub struct NamedLogger {
    name: String,
}

impl NamedLogger {
    fn new(name: &str) -> Self {
        NamedLogger {
            name: name.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Threshold of this logger's category.
    pub fn threshold(&self) -> Level {
        config::threshold(&self.name)
    }

    pub fn fatal(&self, message: impl fmt::Display) {
        self.log(Level::Fatal, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Level::Trace, message);
    }

    pub fn is_fatal_enabled(&self) -> bool {
        self.is_enabled(Level::Fatal)
    }

    pub fn is_error_enabled(&self) -> bool {
        self.is_enabled(Level::Error)
    }

    pub fn is_warn_enabled(&self) -> bool {
        self.is_enabled(Level::Warn)
    }

    pub fn is_info_enabled(&self) -> bool {
        self.is_enabled(Level::Info)
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.is_enabled(Level::Debug)
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.is_enabled(Level::Trace)
    }

    fn is_enabled(&self, level: Level) -> bool {
        level.passes(self.threshold()) && subscriber_enabled(level)
    }

    fn log(&self, level: Level, message: impl fmt::Display) {
        if !self.is_enabled(level) {
            return;
        }
        match context::current_tracking_record() {
            Some(record) => emit(level, &self.name, format_args!("{record} {message}")),
            None => emit(level, &self.name, format_args!("{message}")),
        }
    }
}

fn subscriber_enabled(level: Level) -> bool {
    match level {
        Level::Fatal | Level::Error => tracing::enabled!(tracing::Level::ERROR),
        Level::Warn => tracing::enabled!(tracing::Level::WARN),
        Level::Info => tracing::enabled!(tracing::Level::INFO),
        Level::Debug => tracing::enabled!(tracing::Level::DEBUG),
        Level::Trace => tracing::enabled!(tracing::Level::TRACE),
        Level::All | Level::Off => false,
    }
}

fn emit(level: Level, category: &str, message: fmt::Arguments<'_>) {
    match level {
        Level::Fatal => tracing::error!(category = category, severity = "FATAL", "{message}"),
        Level::Error => tracing::error!(category = category, "{message}"),
        Level::Warn => tracing::warn!(category = category, "{message}"),
        Level::Info => tracing::info!(category = category, "{message}"),
        Level::Debug => tracing::debug!(category = category, "{message}"),
        Level::Trace => tracing::trace!(category = category, "{message}"),
        Level::All | Level::Off => {}
    }
}
