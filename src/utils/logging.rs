//! Logging configuration and subscriber setup

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level, overridden by `RUST_LOG` when set
    pub level: LogLevel,
    /// Output format
    pub format: LogFormat,
    /// Include target module information
    pub target: bool,
    /// Use colored output (if supported)
    pub colored: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            target: false,
            colored: true,
        }
    }
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Single-line text format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Invalid log format: {}", other)),
        }
    }
}

/// Logging system manager
pub struct LoggingSystem {
    config: LoggingConfig,
}

impl LoggingSystem {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Build the level filter, letting `RUST_LOG` take precedence
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()))
    }

    /// Install the global subscriber. Logs go to stderr so stdout stays
    /// free for reports. Fails if a subscriber is already installed.
    pub fn initialize(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_target(self.config.target)
            .with_writer(std::io::stderr);

        match self.config.format {
            LogFormat::Pretty => builder.with_ansi(self.config.colored).pretty().try_init()?,
            LogFormat::Compact => builder.with_ansi(self.config.colored).compact().try_init()?,
            LogFormat::Json => builder.json().try_init()?,
        }

        tracing::debug!(
            level = %self.config.level,
            format = ?self.config.format,
            "Logging system initialized"
        );
        Ok(())
    }

    /// Log build and platform information
    pub fn log_system_info(&self) {
        tracing::info!("Transcoder {}", env!("CARGO_PKG_VERSION"));
        tracing::debug!("Platform: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
        tracing::debug!("Available CPUs: {}", num_cpus::get());
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new(LoggingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels_and_formats() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_logging_config_from_toml() {
        let config: LoggingConfig = toml::from_str("level = \"debug\"\nformat = \"compact\"").unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.colored);
    }
}
