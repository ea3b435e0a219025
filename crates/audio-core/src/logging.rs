//! Logging setup
//!
//! The library only emits `tracing` events under its own target. Hosts that
//! want them printed install a subscriber once with [`setup_logging`], or call
//! [`crate::init`] for the defaults.

use crate::error::{HalError, HalResult};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Target prefix of every event emitted by this crate
pub const LOG_TARGET: &str = "callroute_audio_core";

/// Subscriber settings
///
/// `level` applies to this crate; events of other crates in the host are
/// printed from `others_level` up.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub others_level: Level,
    /// Emit JSON lines instead of human readable text
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            others_level: Level::WARN,
            json: false,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Filter directives used when `RUST_LOG` is not set
    pub fn directives(&self) -> String {
        format!(
            "{},{}={}",
            level_name(self.others_level),
            LOG_TARGET,
            level_name(self.level)
        )
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` replaces the configured levels when set. Fails when a global
/// subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> HalResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())
            .map_err(|e| HalError::invalid_config(format!("bad log filter: {}", e)))?,
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| HalError::invalid_config(format!("cannot install logger: {}", e)))
}

/// Parse a log level name such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> HalResult<Level> {
    Level::from_str(level)
        .map_err(|_| HalError::invalid_config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Ok(Level::DEBUG));
        assert_eq!(parse_log_level("WARN"), Ok(Level::WARN));
        assert!(matches!(
            parse_log_level("loud"),
            Err(HalError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_directives_scope_level_to_crate() {
        assert_eq!(
            LoggingConfig::default().directives(),
            "warn,callroute_audio_core=info"
        );

        let config = LoggingConfig::new(Level::TRACE).with_json().with_file_info();
        assert_eq!(config.directives(), "warn,callroute_audio_core=trace");
        assert!(config.json);
        assert!(config.file_info);
    }

    #[test]
    #[serial]
    fn test_second_install_is_rejected() {
        let _ = setup_logging(&LoggingConfig::default());
        assert!(matches!(
            setup_logging(&LoggingConfig::default()),
            Err(HalError::InvalidConfig { .. })
        ));
    }
}
