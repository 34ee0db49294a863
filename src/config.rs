//! Configuration management for analysis parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling threshold and filter experiments without recompilation. All
//! parameters are validated once, before a session starts; the capture
//! and analysis paths never re-check them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::session::MIN_LEVEL_DB;
use crate::tracker::equal_tempered_octave_frequencies;

/// Complete analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub session: SessionConfig,
    pub spectral: SpectralConfig,
    pub filter_chain: FilterChainConfig,
    pub audio: AudioConfig,
}

/// Session timing and decision parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recording duration in milliseconds
    pub record_duration_ms: u64,
    /// Noise calibration capture duration in milliseconds
    pub calibration_duration_ms: u64,
    /// RMS below this treats a frame as silence (no tracker update)
    pub noise_floor_rms: f32,
    /// Peak magnitude below this means no voice was captured at all
    pub min_peak_magnitude: f32,
    /// Tones whose level relative to the peak stays below this are
    /// missing; must sit above the -120 dB report level floor
    pub detection_threshold_db: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            record_duration_ms: 15_000,
            calibration_duration_ms: 2_000,
            noise_floor_rms: 0.02,
            min_peak_magnitude: 0.01,
            detection_threshold_db: -10.0,
        }
    }
}

/// Spectral analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// FFT window size for spectrum frames (magnitude length = size/2 + 1)
    pub spectrum_window_size: usize,
    /// Window size for the display waveform tap
    pub waveform_window_size: usize,
    /// Frequencies whose presence is judged, in report order
    pub target_frequencies: Vec<f32>,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            spectrum_window_size: 4096,
            waveform_window_size: 2048,
            target_frequencies: equal_tempered_octave_frequencies(),
        }
    }
}

/// Conditioning filter chain parameters
///
/// Stages run in a fixed order (high-pass, low-pass, notch, compressor);
/// a disabled stage is skipped entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterChainConfig {
    pub highpass_enabled: bool,
    /// High-pass cutoff, removes rumble below speech
    pub highpass_cutoff_hz: f32,
    pub lowpass_enabled: bool,
    /// Low-pass cutoff, removes hiss above the band of interest
    pub lowpass_cutoff_hz: f32,
    pub notch_enabled: bool,
    /// Mains hum notch center
    pub notch_center_hz: f32,
    /// Notch selectivity
    pub notch_q: f32,
    pub compressor_enabled: bool,
    pub compressor_threshold_db: f32,
    pub compressor_ratio: f32,
    pub compressor_attack_ms: f32,
    pub compressor_release_ms: f32,
}

impl Default for FilterChainConfig {
    fn default() -> Self {
        Self {
            highpass_enabled: true,
            highpass_cutoff_hz: 85.0,
            lowpass_enabled: true,
            lowpass_cutoff_hz: 8_000.0,
            notch_enabled: true,
            notch_center_hz: 60.0,
            notch_q: 30.0,
            compressor_enabled: true,
            compressor_threshold_db: -50.0,
            compressor_ratio: 12.0,
            compressor_attack_ms: 0.0,
            compressor_release_ms: 250.0,
        }
    }
}

/// Capture transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Size of buffer pool for real-time audio transfer
    pub buffer_pool_size: usize,
    /// Size of each audio buffer in samples
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 32,
            buffer_size: 1024,
        }
    }
}

impl Default for AnalysisConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            spectral: SpectralConfig::default(),
            filter_chain: FilterChainConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or defaults if the file is missing or
    /// fails to parse. Loading never fails; validation is separate.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Validate every parameter, failing fast on the first problem
    ///
    /// Target frequencies are checked for positivity and finiteness here;
    /// the Nyquist bound depends on the capture sample rate and is checked
    /// at session setup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.record_duration_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "record_duration_ms".to_string(),
                value_ms: self.session.record_duration_ms,
            });
        }
        if self.session.calibration_duration_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "calibration_duration_ms".to_string(),
                value_ms: self.session.calibration_duration_ms,
            });
        }
        if !self.spectral.spectrum_window_size.is_power_of_two() {
            return Err(ConfigError::WindowNotPowerOfTwo {
                field: "spectrum_window_size".to_string(),
                size: self.spectral.spectrum_window_size,
            });
        }
        if !self.spectral.waveform_window_size.is_power_of_two() {
            return Err(ConfigError::WindowNotPowerOfTwo {
                field: "waveform_window_size".to_string(),
                size: self.spectral.waveform_window_size,
            });
        }
        if self.spectral.target_frequencies.is_empty() {
            return Err(ConfigError::NoTargetFrequencies);
        }
        for &freq in &self.spectral.target_frequencies {
            if !freq.is_finite() || freq <= 0.0 {
                return Err(ConfigError::InvalidParameter {
                    field: "target_frequencies".to_string(),
                    detail: format!("every frequency must be positive and finite (got {})", freq),
                });
            }
        }
        if !self.session.noise_floor_rms.is_finite() || self.session.noise_floor_rms < 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "noise_floor_rms".to_string(),
                detail: format!("must be non-negative (got {})", self.session.noise_floor_rms),
            });
        }
        if !self.session.min_peak_magnitude.is_finite() || self.session.min_peak_magnitude <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "min_peak_magnitude".to_string(),
                detail: format!("must be positive (got {})", self.session.min_peak_magnitude),
            });
        }
        if !self.session.detection_threshold_db.is_finite()
            || self.session.detection_threshold_db <= MIN_LEVEL_DB
        {
            return Err(ConfigError::InvalidParameter {
                field: "detection_threshold_db".to_string(),
                detail: format!(
                    "must be finite and above the {} dB level floor (got {})",
                    MIN_LEVEL_DB, self.session.detection_threshold_db
                ),
            });
        }
        self.filter_chain.validate()?;
        if self.audio.buffer_pool_size == 0 || self.audio.buffer_size == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "audio".to_string(),
                detail: "buffer_pool_size and buffer_size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl FilterChainConfig {
    /// Validate filter parameters for the enabled stages
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.highpass_enabled && self.highpass_cutoff_hz <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "highpass_cutoff_hz".to_string(),
                detail: format!("must be positive (got {})", self.highpass_cutoff_hz),
            });
        }
        if self.lowpass_enabled && self.lowpass_cutoff_hz <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "lowpass_cutoff_hz".to_string(),
                detail: format!("must be positive (got {})", self.lowpass_cutoff_hz),
            });
        }
        if self.notch_enabled && (self.notch_center_hz <= 0.0 || self.notch_q <= 0.0) {
            return Err(ConfigError::InvalidParameter {
                field: "notch".to_string(),
                detail: format!(
                    "center and Q must be positive (got {} Hz, Q {})",
                    self.notch_center_hz, self.notch_q
                ),
            });
        }
        if self.compressor_enabled {
            if self.compressor_ratio < 1.0 {
                return Err(ConfigError::InvalidParameter {
                    field: "compressor_ratio".to_string(),
                    detail: format!("must be at least 1 (got {})", self.compressor_ratio),
                });
            }
            if self.compressor_attack_ms < 0.0 || self.compressor_release_ms < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    field: "compressor".to_string(),
                    detail: "attack and release must be non-negative".to_string(),
                });
            }
            if !self.compressor_threshold_db.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    field: "compressor_threshold_db".to_string(),
                    detail: "must be finite".to_string(),
                });
            }
        }
        Ok(())
    }
}
