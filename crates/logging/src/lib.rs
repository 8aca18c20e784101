//! ChanRelay Logging
//!
//! Shared `tracing` subscriber setup for ChanRelay binaries. `RUST_LOG`
//! overrides the level picked by the caller.

use std::fmt;

use thiserror::Error;
use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count to a level
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter directive used when `RUST_LOG` is not set.
///
/// Third-party crates stay at `info` unless the caller asks for less.
pub fn default_directive(level: LogLevel) -> String {
    let base = level.min(LogLevel::Info);
    format!("{},chanrelay={}", base, level)
}

/// Install the global subscriber
pub fn try_init(level: LogLevel) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    tracing_subscriber::registry()
        .with(fmt_layer::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Install the global subscriber, ignoring a subscriber that is already set
pub fn init(level: LogLevel) {
    let _ = try_init(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(5), LogLevel::Trace);
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(LogLevel::Info), "info,chanrelay=info");
        assert_eq!(default_directive(LogLevel::Debug), "info,chanrelay=debug");
        assert_eq!(default_directive(LogLevel::Warn), "warn,chanrelay=warn");
    }

    #[test]
    fn test_second_init_fails() {
        init(LogLevel::Info);
        assert!(matches!(
            try_init(LogLevel::Debug),
            Err(LoggingError::AlreadyInitialized(_))
        ));
    }
}
