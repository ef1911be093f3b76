//! Rotation policy
//!
//! Pure decision logic: given a file's byte count and age, decide whether
//! it must rotate out for upload. The variant is chosen once from validated
//! configuration; a threshold of zero inside `SizeOrTime` disables that
//! side, and a policy with no active threshold cannot be constructed.

use std::time::Duration;

use crate::error::{Result, SpoolError};

/// When the current file for a key must rotate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Rotate once the file reaches `max_bytes`
    Size { max_bytes: u64 },
    /// Rotate once the file is `max_age` old
    Time { max_age: Duration },
    /// Rotate when either side triggers; a zero threshold disables that side
    SizeOrTime { max_bytes: u64, max_age: Duration },
}

impl RotationPolicy {
    /// Size-triggered rotation. `max_bytes` must be non-zero.
    pub fn size(max_bytes: u64) -> Result<Self> {
        if max_bytes == 0 {
            return Err(SpoolError::invalid_config(
                "size rotation requires a non-zero size threshold",
            ));
        }
        Ok(Self::Size { max_bytes })
    }

    /// Age-triggered rotation. `max_age` must be non-zero.
    pub fn time(max_age: Duration) -> Result<Self> {
        if max_age.is_zero() {
            return Err(SpoolError::invalid_config(
                "time rotation requires a non-zero time threshold",
            ));
        }
        Ok(Self::Time { max_age })
    }

    /// Rotation on either trigger. At least one threshold must be active.
    pub fn size_or_time(max_bytes: u64, max_age: Duration) -> Result<Self> {
        if max_bytes == 0 && max_age.is_zero() {
            return Err(SpoolError::invalid_config(
                "size-or-time rotation requires at least one active threshold",
            ));
        }
        Ok(Self::SizeOrTime { max_bytes, max_age })
    }

    /// Whether a file with this byte count and age must rotate
    pub fn should_rotate(&self, bytes: u64, age: Duration) -> bool {
        match *self {
            Self::Size { max_bytes } => bytes >= max_bytes,
            Self::Time { max_age } => age >= max_age,
            Self::SizeOrTime { max_bytes, max_age } => {
                (max_bytes > 0 && bytes >= max_bytes)
                    || (!max_age.is_zero() && age >= max_age)
            }
        }
    }

    /// Whether a periodic sweep is needed. Size-only rotation is already
    /// checked on every write; age can expire with no write at all.
    pub fn needs_periodic_check(&self) -> bool {
        match *self {
            Self::Size { .. } => false,
            Self::Time { .. } => true,
            Self::SizeOrTime { max_age, .. } => !max_age.is_zero(),
        }
    }
}
