// Session error types and constants

use crate::error::{ConfigError, ErrorCode};
use log::error;
use std::fmt;

/// Session error code constants
///
/// These constants provide a single source of truth for error codes
/// shared between the library, structured logs, and the CLI.
///
/// Error code range: 1001-1009
pub struct SessionErrorCodes {}

impl SessionErrorCodes {
    /// No usable voice energy was captured during the recording
    pub const NO_VOICE_DETECTED: i32 = 1001;

    /// No input device was available or access was denied
    pub const DEVICE_UNAVAILABLE: i32 = 1002;

    /// Failed to open the capture stream
    pub const STREAM_OPEN_FAILED: i32 = 1003;

    /// Capture stream failed mid-session
    pub const STREAM_FAILURE: i32 = 1004;

    /// A session is already active (or finished and not yet reset)
    pub const SESSION_ACTIVE: i32 = 1005;

    /// Calibration finished without enough captured frames
    pub const INSUFFICIENT_CALIBRATION: i32 = 1006;

    /// The session was cancelled by an explicit reset
    pub const CANCELLED: i32 = 1007;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1008;

    /// Session setup rejected the configuration
    pub const INVALID_CONFIG: i32 = 1009;
}

/// Log a session error with structured context
///
/// This function logs session errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_session_error(err: &SessionError, context: &str) {
    error!(
        "Session error in {}: code={}, component=SessionController, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Session-level errors
///
/// These errors cover the full analysis session lifecycle: device
/// acquisition, capture streaming, calibration hand-off, and the final
/// missing-tone decision.
///
/// Error code range: 1001-1009
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No usable voice energy was captured during the recording
    NoVoiceDetected,

    /// No input device was available or access was denied
    DeviceUnavailable { reason: String },

    /// Failed to open the capture stream
    StreamOpenFailed { reason: String },

    /// Capture stream failed mid-session
    StreamFailure { reason: String },

    /// A session is already active (or finished and not yet reset)
    SessionActive { phase: String },

    /// Calibration finished without enough captured frames
    InsufficientCalibration { frames_captured: u64 },

    /// The session was cancelled by an explicit reset
    Cancelled,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Session setup rejected the configuration
    InvalidConfig { detail: String },
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::NoVoiceDetected => SessionErrorCodes::NO_VOICE_DETECTED,
            SessionError::DeviceUnavailable { .. } => SessionErrorCodes::DEVICE_UNAVAILABLE,
            SessionError::StreamOpenFailed { .. } => SessionErrorCodes::STREAM_OPEN_FAILED,
            SessionError::StreamFailure { .. } => SessionErrorCodes::STREAM_FAILURE,
            SessionError::SessionActive { .. } => SessionErrorCodes::SESSION_ACTIVE,
            SessionError::InsufficientCalibration { .. } => {
                SessionErrorCodes::INSUFFICIENT_CALIBRATION
            }
            SessionError::Cancelled => SessionErrorCodes::CANCELLED,
            SessionError::LockPoisoned { .. } => SessionErrorCodes::LOCK_POISONED,
            SessionError::InvalidConfig { .. } => SessionErrorCodes::INVALID_CONFIG,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::NoVoiceDetected => {
                "No voice detected: recording never exceeded the minimum peak magnitude"
                    .to_string()
            }
            SessionError::DeviceUnavailable { reason } => {
                format!("No usable input device: {}", reason)
            }
            SessionError::StreamOpenFailed { reason } => {
                format!("Failed to open capture stream: {}", reason)
            }
            SessionError::StreamFailure { reason } => {
                format!("Capture stream failed: {}", reason)
            }
            SessionError::SessionActive { phase } => {
                format!(
                    "Session is not idle (current phase {}). Call reset() first.",
                    phase
                )
            }
            SessionError::InsufficientCalibration { frames_captured } => {
                format!(
                    "Calibration captured {} spectrum frames; at least one is required",
                    frames_captured
                )
            }
            SessionError::Cancelled => "Session cancelled by reset".to_string(),
            SessionError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            SessionError::InvalidConfig { detail } => {
                format!("Configuration rejected: {}", detail)
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::InvalidConfig {
            detail: err.message(),
        }
    }
}
