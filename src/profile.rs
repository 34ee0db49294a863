// NoiseProfile - ambient spectrum captured during calibration
//
// The profile stores the mean magnitude of each FFT bin over the
// calibration window. During recording it is subtracted from raw
// magnitudes so that steady background noise (fans, hum, room tone)
// does not register as produced tones.
//
// Profiles are tied to the sample rate and window size they were
// captured with; a profile for a different geometry must be discarded
// and recalibrated.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Per-bin ambient noise magnitudes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseProfile {
    /// Mean magnitude per FFT bin (window_size / 2 + 1 entries)
    pub bins: Vec<f32>,
    /// Sample rate the profile was captured at (Hz)
    pub sample_rate: u32,
    /// FFT window size the profile was captured with
    pub window_size: usize,
}

impl NoiseProfile {
    /// Whether this profile can be reused for the given capture geometry
    pub fn matches(&self, sample_rate: u32, window_size: usize) -> bool {
        self.sample_rate == sample_rate && self.window_size == window_size
    }

    /// Noise-subtracted magnitude for one bin, clamped at zero
    #[inline]
    pub fn cleaned(&self, raw: f32, bin: usize) -> f32 {
        (raw - self.bins[bin]).max(0.0)
    }

    /// Persist the profile as pretty-printed JSON
    ///
    /// # Errors
    /// Returns `StorageError` if the file cannot be written
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Load and validate a profile previously saved with `save_to_file`
    ///
    /// # Errors
    /// Returns `StorageError` if the file cannot be read or parsed, and
    /// `InvalidProfile` if its contents are inconsistent.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let profile: NoiseProfile = serde_json::from_str(&json)?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if self.bins.is_empty() {
            return Err(CalibrationError::InvalidProfile {
                reason: "profile has no bins".to_string(),
            });
        }
        let expected = self.window_size / 2 + 1;
        if self.bins.len() != expected {
            return Err(CalibrationError::InvalidProfile {
                reason: format!(
                    "profile has {} bins but window size {} implies {}",
                    self.bins.len(),
                    self.window_size,
                    expected
                ),
            });
        }
        if let Some(bad) = self.bins.iter().find(|b| !b.is_finite() || **b < 0.0) {
            return Err(CalibrationError::InvalidProfile {
                reason: format!("profile contains invalid magnitude {}", bad),
            });
        }
        Ok(())
    }
}

/// Accumulates spectrum frames during calibration into a mean profile
///
/// Magnitudes are summed in f64 so long calibration windows do not lose
/// precision, then averaged in `finish`.
pub struct NoiseProfileAccumulator {
    sums: Vec<f64>,
    frames: u64,
}

impl NoiseProfileAccumulator {
    /// Create an accumulator for spectra of `spectrum_len` bins
    pub fn new(spectrum_len: usize) -> Self {
        NoiseProfileAccumulator {
            sums: vec![0.0; spectrum_len],
            frames: 0,
        }
    }

    /// Add one spectrum frame's magnitudes to the running sums
    pub fn add_frame(&mut self, magnitudes: &[f32]) {
        debug_assert_eq!(magnitudes.len(), self.sums.len());
        for (sum, &mag) in self.sums.iter_mut().zip(magnitudes) {
            *sum += mag as f64;
        }
        self.frames += 1;
    }

    /// Number of frames accumulated so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Average the accumulated frames into a profile
    ///
    /// # Errors
    /// Returns `InsufficientData` if no frames were accumulated, which
    /// happens when the capture stream produced too few samples for even
    /// one analysis window.
    pub fn finish(
        self,
        sample_rate: u32,
        window_size: usize,
    ) -> Result<NoiseProfile, CalibrationError> {
        if self.frames == 0 {
            return Err(CalibrationError::InsufficientData { frames_captured: 0 });
        }

        let count = self.frames as f64;
        let bins = self.sums.iter().map(|sum| (sum / count) as f32).collect();

        Ok(NoiseProfile {
            bins,
            sample_rate,
            window_size,
        })
    }
}
