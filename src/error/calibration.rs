// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// These constants provide a single source of truth for error codes
/// shared between the library, structured logs, and the CLI.
///
/// Error code range: 2001-2003
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Calibration capture produced too few spectrum frames
    pub const INSUFFICIENT_DATA: i32 = 2001;

    /// Noise profile could not be read from or written to disk
    pub const STORAGE_ERROR: i32 = 2002;

    /// Stored noise profile parsed but failed content validation
    pub const INVALID_PROFILE: i32 = 2003;
}

/// Log a calibration error with structured context
///
/// This function logs calibration errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=NoiseCalibration, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// These errors cover noise-profile capture and persistence.
///
/// Error code range: 2001-2003
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Calibration capture produced too few spectrum frames
    InsufficientData { frames_captured: u64 },

    /// Noise profile could not be read from or written to disk
    StorageError { reason: String },

    /// Stored noise profile parsed but failed content validation
    InvalidProfile { reason: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InsufficientData { .. } => CalibrationErrorCodes::INSUFFICIENT_DATA,
            CalibrationError::StorageError { .. } => CalibrationErrorCodes::STORAGE_ERROR,
            CalibrationError::InvalidProfile { .. } => CalibrationErrorCodes::INVALID_PROFILE,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InsufficientData { frames_captured } => {
                format!(
                    "Calibration needs at least one spectrum frame (captured {})",
                    frames_captured
                )
            }
            CalibrationError::StorageError { reason } => {
                format!("Noise profile storage failed: {}", reason)
            }
            CalibrationError::InvalidProfile { reason } => {
                format!("Stored noise profile is invalid: {}", reason)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        CalibrationError::StorageError {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::StorageError {
            reason: err.to_string(),
        }
    }
}
