// Configuration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 3001-3006
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    /// A duration field is zero
    pub const INVALID_DURATION: i32 = 3001;

    /// An analysis window size is not a power of two
    pub const WINDOW_NOT_POWER_OF_TWO: i32 = 3002;

    /// The target frequency list is empty
    pub const NO_TARGET_FREQUENCIES: i32 = 3003;

    /// A target frequency falls outside the analyzable range
    pub const TARGET_OUT_OF_RANGE: i32 = 3004;

    /// Noise profile length does not match the spectrum frame length
    pub const PROFILE_LENGTH_MISMATCH: i32 = 3005;

    /// A numeric parameter is out of its valid range
    pub const INVALID_PARAMETER: i32 = 3006;
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, component=AnalysisConfig, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Configuration validation errors
///
/// Every parameter problem is rejected before a session starts; nothing
/// in the capture or analysis path re-validates at runtime.
///
/// Error code range: 3001-3006
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A duration field is zero
    InvalidDuration { field: String, value_ms: u64 },

    /// An analysis window size is not a power of two
    WindowNotPowerOfTwo { field: String, size: usize },

    /// The target frequency list is empty
    NoTargetFrequencies,

    /// A target frequency falls outside the analyzable range
    TargetOutOfRange { frequency_hz: f32, nyquist_hz: f32 },

    /// Noise profile length does not match the spectrum frame length
    ProfileLengthMismatch { expected: usize, actual: usize },

    /// A numeric parameter is out of its valid range
    InvalidParameter { field: String, detail: String },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidDuration { .. } => ConfigErrorCodes::INVALID_DURATION,
            ConfigError::WindowNotPowerOfTwo { .. } => ConfigErrorCodes::WINDOW_NOT_POWER_OF_TWO,
            ConfigError::NoTargetFrequencies => ConfigErrorCodes::NO_TARGET_FREQUENCIES,
            ConfigError::TargetOutOfRange { .. } => ConfigErrorCodes::TARGET_OUT_OF_RANGE,
            ConfigError::ProfileLengthMismatch { .. } => ConfigErrorCodes::PROFILE_LENGTH_MISMATCH,
            ConfigError::InvalidParameter { .. } => ConfigErrorCodes::INVALID_PARAMETER,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::InvalidDuration { field, value_ms } => {
                format!("{} must be greater than 0 (got {} ms)", field, value_ms)
            }
            ConfigError::WindowNotPowerOfTwo { field, size } => {
                format!("{} must be a power of two (got {})", field, size)
            }
            ConfigError::NoTargetFrequencies => {
                "At least one target frequency is required".to_string()
            }
            ConfigError::TargetOutOfRange {
                frequency_hz,
                nyquist_hz,
            } => {
                format!(
                    "Target frequency {} Hz is outside the analyzable range (0, {} Hz)",
                    frequency_hz, nyquist_hz
                )
            }
            ConfigError::ProfileLengthMismatch { expected, actual } => {
                format!(
                    "Noise profile has {} bins but the spectrum frame has {}",
                    actual, expected
                )
            }
            ConfigError::InvalidParameter { field, detail } => {
                format!("{}: {}", field, detail)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}
