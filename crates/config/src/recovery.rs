//! Startup crash recovery configuration

use serde::Deserialize;

/// Startup recovery scan configuration
///
/// # Example
///
/// ```toml
/// [recovery]
/// enabled = true
/// workers = 2
/// ```
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Scan the buffer directory for stranded files at startup
    /// Default: true
    pub enabled: bool,

    /// Worker tasks draining the recovery queue
    /// Default: 2
    pub workers: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecoveryConfig::default();
        assert!(config.enabled);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_deserialize_disabled() {
        let config: RecoveryConfig = toml::from_str("enabled = false").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.workers, 2);
    }
}
