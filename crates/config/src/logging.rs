//! Logging configuration
//!
//! Controls the internal logging behavior of Barge.

use std::io;

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level - very verbose
    Trace,
    /// Debug level - debugging information
    Debug,
    /// Info level - normal operation (default)
    #[default]
    Info,
    /// Warn level - warnings only
    Warn,
    /// Error level - errors only
    Error,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output (default)
    #[default]
    Console,
    /// JSON structured logging
    Json,
}

/// Log output destination
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Write to stdout (default)
    #[default]
    Stdout,
    /// Write to stderr
    Stderr,
}

/// Logging configuration
///
/// # Example
///
/// ```toml
/// [log]
/// level = "info"
/// format = "console"
/// output = "stdout"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: info
    pub level: LogLevel,

    /// Output format (console, json)
    /// Default: console
    pub format: LogFormat,

    /// Output destination (stdout, stderr)
    /// Default: stdout
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Console,
            output: LogOutput::Stdout,
        }
    }
}

impl LogConfig {
    /// Install the global tracing subscriber described by this config.
    ///
    /// `RUST_LOG` overrides the configured level when set. Repeat calls
    /// keep the first subscriber.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.level.as_str()))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);
        match (self.format, self.output) {
            (LogFormat::Console, LogOutput::Stdout) => registry
                .with(fmt::layer().with_target(true).with_thread_ids(false))
                .try_init()
                .ok(),
            (LogFormat::Console, LogOutput::Stderr) => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok(),
            (LogFormat::Json, LogOutput::Stdout) => {
                registry.with(fmt::layer().json()).try_init().ok()
            }
            (LogFormat::Json, LogOutput::Stderr) => registry
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Console);
        assert_eq!(config.output, LogOutput::Stdout);
    }

    #[test]
    fn test_deserialize_empty() {
        let config: LogConfig = toml::from_str("").unwrap();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Console);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
level = "debug"
format = "json"
output = "stderr"
"#;
        let config: LogConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stderr);
    }

    #[test]
    fn test_deserialize_all_levels() {
        for (s, expected) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let toml = format!("level = \"{}\"", s);
            let config: LogConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.level, expected);
        }
    }

    #[test]
    fn test_level_as_str() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Info.as_str(), "info");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::default();
        config.init();
        config.init();
    }
}
