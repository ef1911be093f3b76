//! Barge Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use barge_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[buffer]\nsize_threshold = 1048576").unwrap();
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [buffer]
//! dir = "/var/lib/barge/spool"
//!
//! [upload]
//! workers = 8
//! key_prefix = "prod/logs"
//! ```

mod buffer;
mod error;
mod logging;
mod recovery;
mod upload;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use buffer::{BufferConfig, Encoding, RotationStrategy};
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use recovery::RecoveryConfig;
pub use upload::{OnFull, UploadConfig};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local buffering and rotation
    pub buffer: BufferConfig,

    /// Upload pool and destination options
    pub upload: UploadConfig,

    /// Startup crash recovery
    pub recovery: RecoveryConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Checks for:
    /// - Usable thresholds for the active rotation strategy
    /// - Non-empty worker pools
    /// - Multipart sizes the store will accept
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
