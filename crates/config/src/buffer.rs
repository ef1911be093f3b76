//! Local buffering and rotation configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// When a key's current file is rotated out for upload
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Rotate when the file reaches `size_threshold` bytes (default)
    #[default]
    Size,
    /// Rotate when the file is `time_threshold` old
    Time,
    /// Rotate on whichever of the two trips first
    SizeOrTime,
}

/// On-disk payload encoding
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Raw bytes, appended as-is (default)
    #[default]
    None,
    /// Gzip, one complete member per write
    Gzip,
}

/// Local buffering configuration
///
/// # Example
///
/// ```toml
/// [buffer]
/// dir = "/var/lib/barge/spool"
/// strategy = "size_or_time"
/// size_threshold = 67108864
/// time_threshold = "10m"
/// sweep_interval = "30s"
/// encoding = "gzip"
/// key_template = "${host}-${app}"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Directory buffered files are written to
    /// Default: "spool"
    pub dir: PathBuf,

    /// Rotation strategy (size, time, size_or_time)
    /// Default: size
    pub strategy: RotationStrategy,

    /// Rotate once a file holds this many bytes
    /// Default: 64MB
    pub size_threshold: u64,

    /// Rotate once a file reaches this age
    /// Default: 10m
    #[serde(with = "humantime_serde")]
    pub time_threshold: Duration,

    /// Cadence of the background staleness sweep
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Payload encoding (none, gzip)
    /// Default: none
    pub encoding: Encoding,

    /// Template the per-record key is rendered from, `${field}` syntax
    /// Default: "${key}"
    pub key_template: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("spool"),
            strategy: RotationStrategy::Size,
            size_threshold: 64 * 1024 * 1024, // 64MB
            time_threshold: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            encoding: Encoding::None,
            key_template: "${key}".to_string(),
        }
    }
}
