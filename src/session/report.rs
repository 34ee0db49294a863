// MissingToneResult - the final decision computed once, at recording end
//
// For each target frequency the tracker's running-maximum cleaned
// magnitude is converted to dB relative to the peak reference:
// dB = 20 * log10(max / peak). A tone is judged missing when its dB
// falls below the configured detection threshold.

use serde::Serialize;

use crate::tracker::{nearest_note_name, ToneEnergyTracker};

/// Floor for per-tone dB readings
///
/// `log10(0)` is -inf and serde_json cannot encode infinities, so
/// readings clamp here. A threshold at or below the floor could never
/// mark a tone missing, so configuration validation rejects those.
pub const MIN_LEVEL_DB: f32 = -120.0;

/// Final per-tone measurement
#[derive(Debug, Clone, Serialize)]
pub struct ToneReading {
    /// Target frequency in Hz
    pub frequency_hz: f32,
    /// Nearest equal-tempered note name, e.g. "A4"
    pub note: String,
    /// Final running-maximum cleaned magnitude
    pub magnitude: f32,
    /// dB relative to the peak reference, floored at [`MIN_LEVEL_DB`]
    pub level_db: f32,
    /// Whether this tone fell below the detection threshold
    pub missing: bool,
}

/// Outcome of one completed recording session
#[derive(Debug, Clone, Serialize)]
pub struct MissingToneResult {
    /// One reading per target frequency, in target order
    pub tones: Vec<ToneReading>,
    /// Frequencies judged missing, in target order
    pub missing: Vec<f32>,
    /// Peak reference used as the dB denominator
    pub peak_reference: f32,
    /// Detection threshold the verdicts were computed against
    pub threshold_db: f32,
    /// Spectrum frames processed during recording, gated or not
    pub frames_processed: u64,
}

impl MissingToneResult {
    /// Evaluate the tracker's accumulated state against a threshold
    ///
    /// The caller is responsible for the minimum-input guard: a peak
    /// reference of zero (no frame ever passed the silence gate) must be
    /// reported as "no voice detected" instead of calling this.
    pub fn from_tracker(tracker: &ToneEnergyTracker, threshold_db: f32) -> Self {
        let peak = tracker.peak_reference();
        let frequencies = tracker.targets().frequencies();

        let mut tones = Vec::with_capacity(frequencies.len());
        let mut missing = Vec::new();

        for (&frequency_hz, &magnitude) in frequencies.iter().zip(tracker.maxima()) {
            let level_db = if magnitude > 0.0 && peak > 0.0 {
                (20.0 * (magnitude / peak).log10()).max(MIN_LEVEL_DB)
            } else {
                MIN_LEVEL_DB
            };
            let is_missing = level_db < threshold_db;
            if is_missing {
                missing.push(frequency_hz);
            }
            tones.push(ToneReading {
                frequency_hz,
                note: nearest_note_name(frequency_hz),
                magnitude,
                level_db,
                missing: is_missing,
            });
        }

        MissingToneResult {
            tones,
            missing,
            peak_reference: peak,
            threshold_db,
            frames_processed: tracker.frames_seen(),
        }
    }
}
