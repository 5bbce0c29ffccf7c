// crates/promstore-config/src/logging.rs
// ============================================================================
// Module: Logging Setup
// Description: Installs the global tracing subscriber from configuration.
// Purpose: Route adapter and store events to stderr as text or JSON.
// Dependencies: tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! `RUST_LOG` takes precedence over the configured level when it is set and
//! parses. Installing twice is not an error; the first subscriber wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;
use crate::config::LogFormat;
use crate::config::LoggingConfig;

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Parses a configured log level.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for anything other than `debug`, `info`,
/// `warn`, or `error`.
pub fn parse_level(value: &str) -> Result<Level, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(ConfigError::Invalid(format!("logging.level `{other}` is not supported"))),
    }
}

/// Installs the global subscriber.
///
/// Returns `false` when another subscriber was already installed.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the configured level is invalid.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(level = %level, "logging initialized");
    }
    Ok(installed)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions use unwrap for clarity.")]

    use tracing::Level;

    use super::parse_level;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert_eq!(parse_level(" debug ").unwrap(), Level::DEBUG);
    }

    #[test]
    fn trace_is_not_accepted() {
        assert!(parse_level("trace").is_err());
        assert!(parse_level("").is_err());
    }
}
