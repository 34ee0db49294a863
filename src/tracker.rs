// ToneEnergyTracker - per-target magnitude tracking during recording
//
// Consumes spectrum frames and maintains, for each target frequency, the
// maximum noise-subtracted magnitude seen so far, plus a peak reference
// used as the denominator of the relative-dB scale. Frames whose RMS
// falls below the noise floor are gated: they update nothing, so a pause
// between words cannot drag the peak reference toward zero and flip
// verdicts to "missing".
//
// The peak reference is deliberately the loudest bin of the most recent
// non-gated frame rather than a running maximum: dB-below-peak then
// tracks the speaker's current volume, not their loudest-ever moment.

use serde::Serialize;

use crate::dsp::SpectrumFrame;
use crate::error::ConfigError;
use crate::profile::NoiseProfile;

/// The twelve equal-tempered semitones of the fourth octave, C4..B4
///
/// Computed as `440 * 2^((n - 9) / 12)` for `n` in `0..12`, so index 9
/// is exactly A4 = 440 Hz.
pub fn equal_tempered_octave_frequencies() -> Vec<f32> {
    (0..12)
        .map(|n| 440.0 * 2.0_f32.powf((n as f32 - 9.0) / 12.0))
        .collect()
}

/// Name of the equal-tempered note nearest to a frequency, e.g. "A4"
pub fn nearest_note_name(frequency_hz: f32) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let midi = (69.0 + 12.0 * (frequency_hz / 440.0).log2()).round() as i32;
    let name = NAMES[midi.rem_euclid(12) as usize];
    let octave = midi / 12 - 1;
    format!("{}{}", name, octave)
}

/// Validated target frequencies with their pre-computed FFT bin indices
#[derive(Debug, Clone)]
pub struct TargetFrequencySet {
    frequencies: Vec<f32>,
    bins: Vec<usize>,
}

impl TargetFrequencySet {
    /// Validate frequencies against the capture geometry and map each to
    /// its nearest FFT bin (`round(f * window / sample_rate)`)
    ///
    /// # Errors
    /// Returns `NoTargetFrequencies` for an empty list and
    /// `TargetOutOfRange` for any frequency that is not strictly between
    /// zero and the Nyquist frequency.
    pub fn new(
        frequencies: Vec<f32>,
        window_size: usize,
        sample_rate: u32,
    ) -> Result<Self, ConfigError> {
        if frequencies.is_empty() {
            return Err(ConfigError::NoTargetFrequencies);
        }

        let nyquist = sample_rate as f32 / 2.0;
        let mut bins = Vec::with_capacity(frequencies.len());
        for &frequency in &frequencies {
            if !frequency.is_finite() || frequency <= 0.0 || frequency >= nyquist {
                return Err(ConfigError::TargetOutOfRange {
                    frequency_hz: frequency,
                    nyquist_hz: nyquist,
                });
            }
            let bin = (frequency * window_size as f32 / sample_rate as f32).round() as usize;
            bins.push(bin);
        }

        Ok(TargetFrequencySet { frequencies, bins })
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// Per-frame tracker output, published for live display
#[derive(Debug, Clone, Serialize)]
pub struct LevelUpdate {
    /// Instantaneous normalized magnitude per target, `cleaned / peak`
    pub levels: Vec<f32>,
    /// RMS of the frame's time-domain window
    pub rms: f32,
    /// Whether the frame fell below the noise floor and updated nothing
    pub gated: bool,
    /// Zero-based index of the frame within the recording
    pub frame_index: u64,
}

/// Running per-target maxima and peak reference for one recording
#[derive(Debug)]
pub struct ToneEnergyTracker {
    targets: TargetFrequencySet,
    profile: NoiseProfile,
    noise_floor_rms: f32,
    maxima: Vec<f32>,
    peak_reference: f32,
    frames_seen: u64,
}

impl ToneEnergyTracker {
    /// Create a tracker for one recording phase
    ///
    /// # Arguments
    /// * `targets` - validated target set for the capture geometry
    /// * `profile` - calibrated noise profile, one entry per spectrum bin
    /// * `spectrum_len` - bins per frame the producer will emit
    /// * `noise_floor_rms` - silence gate threshold
    ///
    /// # Errors
    /// Returns `ProfileLengthMismatch` if the profile was captured with a
    /// different spectrum geometry than the producer will emit.
    pub fn new(
        targets: TargetFrequencySet,
        profile: NoiseProfile,
        spectrum_len: usize,
        noise_floor_rms: f32,
    ) -> Result<Self, ConfigError> {
        if profile.bins.len() != spectrum_len {
            return Err(ConfigError::ProfileLengthMismatch {
                expected: spectrum_len,
                actual: profile.bins.len(),
            });
        }

        let maxima = vec![0.0; targets.len()];
        Ok(ToneEnergyTracker {
            targets,
            profile,
            noise_floor_rms,
            maxima,
            peak_reference: 0.0,
            frames_seen: 0,
        })
    }

    /// Process one spectrum frame
    ///
    /// Gated frames (RMS below the noise floor) report zero levels and
    /// leave both the maxima and the peak reference untouched.
    pub fn on_frame(&mut self, frame: &SpectrumFrame) -> LevelUpdate {
        let frame_index = self.frames_seen;
        self.frames_seen += 1;

        if frame.rms < self.noise_floor_rms {
            return LevelUpdate {
                levels: vec![0.0; self.targets.len()],
                rms: frame.rms,
                gated: true,
                frame_index,
            };
        }

        // Denominator for the dB scale: the loudest bin of this frame.
        let peak = frame.magnitudes.iter().fold(0.0_f32, |acc, &m| acc.max(m));
        self.peak_reference = peak;

        let mut levels = Vec::with_capacity(self.targets.len());
        for (slot, &bin) in self.maxima.iter_mut().zip(self.targets.bins()) {
            let cleaned = self.profile.cleaned(frame.magnitudes[bin], bin);
            if cleaned > *slot {
                *slot = cleaned;
            }
            let level = if peak > 0.0 {
                (cleaned / peak).clamp(0.0, 1.0)
            } else {
                0.0
            };
            levels.push(level);
        }

        LevelUpdate {
            levels,
            rms: frame.rms,
            gated: false,
            frame_index,
        }
    }

    /// Final running maximum of cleaned magnitude per target
    pub fn maxima(&self) -> &[f32] {
        &self.maxima
    }

    /// Peak magnitude of the most recent non-gated frame
    pub fn peak_reference(&self) -> f32 {
        self.peak_reference
    }

    pub fn targets(&self) -> &TargetFrequencySet {
        &self.targets
    }

    /// Total frames processed, gated or not
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
