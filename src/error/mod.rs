// Error types for the tone gap analyzer
//
// This module defines custom error types for session, calibration, and
// configuration failures, providing structured error handling with stable
// numeric codes shared by the library, logs, and the CLI exit paths.

mod calibration;
mod config;
mod session;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use config::{log_config_error, ConfigError, ConfigErrorCodes};
pub use session::{log_session_error, SessionError, SessionErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the library, structured logs, and CLI exit codes.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
