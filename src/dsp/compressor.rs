// Dynamics compressor - evens out level swings before spectral analysis
//
// Feed-forward design with a dB-domain envelope follower. The envelope
// attacks and releases with one-pole smoothing; gain reduction above the
// threshold is `over * (1 - 1/ratio)`, followed by a fixed makeup gain
// of 0.6 times the reduction a full-scale signal would see.

/// Envelope level treated as silence, and the reset level
const SILENCE_DB: f32 = -120.0;

/// Fraction of the full-scale gain reduction restored as makeup
const MAKEUP_EXPONENT: f32 = 0.6;

/// Mono dynamics compressor
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_gain: f32,
    envelope_db: f32,
}

impl Compressor {
    /// Create a compressor
    ///
    /// # Arguments
    /// * `sample_rate` - Stream sample rate in Hz
    /// * `threshold_db` - Level above which gain reduction applies
    /// * `ratio` - Compression ratio (12.0 means 12:1), must be >= 1
    /// * `attack_ms` - Envelope rise time; 0 attacks instantly
    /// * `release_ms` - Envelope fall time
    pub fn new(
        sample_rate: f32,
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
    ) -> Self {
        // A zero time constant makes the exponent -inf and the
        // coefficient exactly 0, i.e. the envelope tracks instantly.
        let attack_coeff = (-1.0 / (attack_ms * 0.001 * sample_rate)).exp();
        let release_coeff = (-1.0 / (release_ms * 0.001 * sample_rate)).exp();

        // Makeup restores MAKEUP_EXPONENT of the reduction a 0 dBFS
        // signal would see, so ratio 1 or a non-negative threshold
        // leaves the gain at unity.
        let full_scale_reduction_db = (-threshold_db).max(0.0) * (1.0 - 1.0 / ratio);
        let makeup_gain = 10.0_f32.powf(MAKEUP_EXPONENT * full_scale_reduction_db / 20.0);

        Self {
            threshold_db,
            ratio,
            attack_coeff,
            release_coeff,
            makeup_gain,
            envelope_db: SILENCE_DB,
        }
    }

    /// Compress one sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let level_db = (x.abs() + 1e-10).log10() * 20.0;

        let coeff = if level_db > self.envelope_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * level_db;

        let gain_reduction_db = if self.envelope_db > self.threshold_db {
            (self.envelope_db - self.threshold_db) * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };

        x * 10.0_f32.powf(-gain_reduction_db / 20.0) * self.makeup_gain
    }

    /// Compress a block in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Drop the envelope back to silence (start of a new capture)
    pub fn reset(&mut self) {
        self.envelope_db = SILENCE_DB;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44_100.0;

    /// Makeup gain for the -50 dB / 12:1 settings used in these tests
    fn makeup_50_12() -> f32 {
        10.0_f32.powf(0.6 * 50.0 * (1.0 - 1.0 / 12.0) / 20.0)
    }

    #[test]
    fn test_signal_below_threshold_sees_only_makeup() {
        // -60 dB signal, -50 dB threshold: envelope never crosses, so
        // the only gain applied is the fixed makeup
        let mut compressor = Compressor::new(SAMPLE_RATE, -50.0, 12.0, 0.0, 250.0);
        let makeup = makeup_50_12();
        let input: Vec<f32> = (0..4_096)
            .map(|i| 0.001 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE).sin())
            .collect();
        for &x in &input {
            let y = compressor.process_sample(x);
            assert!(
                (y - x * makeup).abs() < 1e-5,
                "Below-threshold sample should scale by makeup only: {} -> {}",
                x,
                y
            );
        }
    }

    #[test]
    fn test_loud_signal_is_attenuated_at_ratio() {
        // Constant |x| = 0.5 is -6.02 dB; with a -50 dB threshold and 12:1
        // ratio the reduction is 43.98 * (1 - 1/12) = 40.3 dB, against
        // 27.5 dB of makeup
        let mut compressor = Compressor::new(SAMPLE_RATE, -50.0, 12.0, 0.0, 250.0);
        let mut last = 0.0;
        for i in 0..4_096 {
            let x = if i % 2 == 0 { 0.5 } else { -0.5 };
            last = compressor.process_sample(x).abs();
        }
        let level_db = 20.0 * 0.5_f32.log10();
        let reduction_db = (level_db + 50.0) * (1.0 - 1.0 / 12.0);
        let expected = 0.5 * 10.0_f32.powf(-reduction_db / 20.0) * makeup_50_12();
        assert!(
            (last - expected).abs() < 1e-3,
            "Expected steady-state output ~{}, got {}",
            expected,
            last
        );
    }

    #[test]
    fn test_unity_ratio_never_reduces() {
        let mut compressor = Compressor::new(SAMPLE_RATE, -50.0, 1.0, 0.0, 250.0);
        for i in 0..1_024 {
            let x = if i % 2 == 0 { 0.5 } else { -0.5 };
            let y = compressor.process_sample(x);
            assert!(
                (y - x).abs() < 1e-6,
                "Ratio 1:1 should pass samples through: {} -> {}",
                x,
                y
            );
        }
    }

    #[test]
    fn test_reset_drops_envelope_to_silence() {
        let mut compressor = Compressor::new(SAMPLE_RATE, -50.0, 12.0, 0.0, 250.0);
        // Drive the envelope up, then reset
        for _ in 0..1_024 {
            compressor.process_sample(0.5);
        }
        compressor.reset();
        let y = compressor.process_sample(0.001);
        assert!(
            (y - 0.001 * makeup_50_12()).abs() < 1e-5,
            "After reset a quiet sample should see no reduction, got {}",
            y
        );
    }
}
