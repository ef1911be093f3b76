//! Configuration validation
//!
//! Validates config consistency:
//! - The active rotation strategy has a usable threshold
//! - Periodic strategies have a running sweep
//! - Worker pools have at least one worker
//! - Multipart sizes respect the store minimum
//! - The key template is structurally sound

use crate::error::{ConfigError, Result};
use crate::{BufferConfig, Config, RecoveryConfig, RotationStrategy, UploadConfig};
use barge_store::MIN_MULTIPART_CHUNK;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_buffer(&config.buffer)?;
    validate_upload(&config.upload)?;
    validate_recovery(&config.recovery)?;
    Ok(())
}

/// Validate the buffering section
fn validate_buffer(buffer: &BufferConfig) -> Result<()> {
    if buffer.dir.as_os_str().is_empty() {
        return Err(ConfigError::invalid_value(
            "buffer",
            "dir",
            "must not be empty",
        ));
    }

    match buffer.strategy {
        RotationStrategy::Size => {
            if buffer.size_threshold == 0 {
                return Err(ConfigError::invalid_value(
                    "buffer",
                    "size_threshold",
                    "must be positive for the size strategy",
                ));
            }
        }
        RotationStrategy::Time => {
            if buffer.time_threshold.is_zero() {
                return Err(ConfigError::invalid_value(
                    "buffer",
                    "time_threshold",
                    "must be positive for the time strategy",
                ));
            }
        }
        RotationStrategy::SizeOrTime => {
            // a zero threshold disables that side; both-disabled is an error
            if buffer.size_threshold == 0 && buffer.time_threshold.is_zero() {
                return Err(ConfigError::invalid_value(
                    "buffer",
                    "strategy",
                    "size_or_time needs at least one active threshold",
                ));
            }
        }
    }

    // Age-based rotation only fires when something sweeps for it
    let age_active = match buffer.strategy {
        RotationStrategy::Size => false,
        RotationStrategy::Time => true,
        RotationStrategy::SizeOrTime => !buffer.time_threshold.is_zero(),
    };
    if age_active && buffer.sweep_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "buffer",
            "sweep_interval",
            "must be positive when rotation depends on file age",
        ));
    }

    validate_template(&buffer.key_template)
}

/// Structural check on the key template; full parsing happens in the
/// engine, this only rejects obvious authoring mistakes early.
fn validate_template(template: &str) -> Result<()> {
    if template.is_empty() {
        return Err(ConfigError::invalid_value(
            "buffer",
            "key_template",
            "must not be empty",
        ));
    }
    let opens = template.matches("${").count();
    let closes = template.matches('}').count();
    if opens > closes {
        return Err(ConfigError::invalid_value(
            "buffer",
            "key_template",
            "unterminated ${ placeholder",
        ));
    }
    Ok(())
}

/// Validate the upload section
fn validate_upload(upload: &UploadConfig) -> Result<()> {
    if upload.workers == 0 {
        return Err(ConfigError::invalid_value(
            "upload",
            "workers",
            "must be at least 1",
        ));
    }
    if upload.retry_attempts == 0 && upload.retry_delay.is_zero() {
        return Err(ConfigError::invalid_value(
            "upload",
            "retry_delay",
            "must be positive when retry_attempts is unbounded",
        ));
    }
    if upload.multipart_chunk_size < MIN_MULTIPART_CHUNK {
        return Err(ConfigError::invalid_value(
            "upload",
            "multipart_chunk_size",
            format!("must be at least {} bytes", MIN_MULTIPART_CHUNK),
        ));
    }
    if upload.multipart_threshold < upload.multipart_chunk_size {
        return Err(ConfigError::invalid_value(
            "upload",
            "multipart_threshold",
            "must not be below multipart_chunk_size",
        ));
    }
    Ok(())
}

/// Validate the recovery section
fn validate_recovery(recovery: &RecoveryConfig) -> Result<()> {
    if recovery.enabled && recovery.workers == 0 {
        return Err(ConfigError::invalid_value(
            "recovery",
            "workers",
            "must be at least 1 when recovery is enabled",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_size_threshold_rejected() {
        let toml = r#"
[buffer]
strategy = "size"
size_threshold = 0
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("size_threshold"));
    }

    #[test]
    fn test_zero_time_threshold_rejected() {
        let toml = r#"
[buffer]
strategy = "time"
time_threshold = "0s"
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("time_threshold"));
    }

    #[test]
    fn test_time_strategy_needs_sweep() {
        let toml = r#"
[buffer]
strategy = "time"
sweep_interval = "0s"
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sweep_interval"));
    }

    #[test]
    fn test_size_strategy_ignores_sweep() {
        let toml = r#"
[buffer]
strategy = "size"
sweep_interval = "0s"
"#;
        assert!(Config::from_str(toml).is_ok());
    }

    #[test]
    fn test_size_or_time_single_side_allowed() {
        let toml = r#"
[buffer]
strategy = "size_or_time"
size_threshold = 0
time_threshold = "5m"
"#;
        assert!(Config::from_str(toml).is_ok());

        // age side disabled: no sweep required either
        let toml = r#"
[buffer]
strategy = "size_or_time"
time_threshold = "0s"
sweep_interval = "0s"
"#;
        assert!(Config::from_str(toml).is_ok());
    }

    #[test]
    fn test_size_or_time_both_disabled_rejected() {
        let toml = r#"
[buffer]
strategy = "size_or_time"
size_threshold = 0
time_threshold = "0s"
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least one"));
    }

    #[test]
    fn test_empty_template_rejected() {
        let toml = r#"
[buffer]
key_template = ""
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("key_template"));
    }

    #[test]
    fn test_unterminated_placeholder_rejected() {
        let toml = r#"
[buffer]
key_template = "${host"
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unterminated"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let toml = r#"
[upload]
workers = 0
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("workers"));
    }

    #[test]
    fn test_unbounded_retry_needs_delay() {
        let toml = r#"
[upload]
retry_attempts = 0
retry_delay = "0s"
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("retry_delay"));
    }

    #[test]
    fn test_small_multipart_chunk_rejected() {
        let toml = r#"
[upload]
multipart_chunk_size = 1024
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("multipart_chunk_size"));
    }

    #[test]
    fn test_threshold_below_chunk_rejected() {
        let toml = r#"
[upload]
multipart_threshold = 5242880
multipart_chunk_size = 8388608
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("multipart_threshold"));
    }

    #[test]
    fn test_zero_recovery_workers_rejected() {
        let toml = r#"
[recovery]
workers = 0
"#;
        let result = Config::from_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("workers"));
    }

    #[test]
    fn test_disabled_recovery_skips_worker_check() {
        let toml = r#"
[recovery]
enabled = false
workers = 0
"#;
        assert!(Config::from_str(toml).is_ok());
    }
}
