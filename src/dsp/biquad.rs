// Biquad filter - second-order IIR sections for stream conditioning
//
// Coefficients follow the RBJ audio EQ cookbook. Only the responses the
// conditioning chain needs are provided: high-pass, low-pass, and notch.

use std::f64::consts::PI;

/// Second-order IIR filter over a mono f32 stream
///
/// Coefficients are computed in f64 and stored as f32 (the narrow 60 Hz
/// notch loses accuracy if the intermediate trig runs in f32). State is
/// direct form I and persists across blocks.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// High-pass section, attenuates below `cutoff_hz`
    pub fn high_pass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let (cos_omega, alpha) = Self::intermediates(sample_rate, cutoff_hz, q);
        let b0 = (1.0 + cos_omega) / 2.0;
        let b1 = -(1.0 + cos_omega);
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;
        Self::from_normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Low-pass section, attenuates above `cutoff_hz`
    pub fn low_pass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let (cos_omega, alpha) = Self::intermediates(sample_rate, cutoff_hz, q);
        let b1 = 1.0 - cos_omega;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;
        Self::from_normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Notch section, rejects a narrow band around `center_hz`
    pub fn notch(sample_rate: f32, center_hz: f32, q: f32) -> Self {
        let (cos_omega, alpha) = Self::intermediates(sample_rate, center_hz, q);
        let b0 = 1.0;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;
        Self::from_normalized(b0, b1, b2, a0, a1, a2)
    }

    fn intermediates(sample_rate: f32, frequency_hz: f32, q: f32) -> (f64, f64) {
        let omega = 2.0 * PI * frequency_hz as f64 / sample_rate as f64;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q as f64);
        (cos_omega, alpha)
    }

    fn from_normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Filter one sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Filter a block in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Clear filter state (start of a new capture)
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}
