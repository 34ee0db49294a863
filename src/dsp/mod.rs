// DSP primitives for the capture conditioning and analysis pipeline
//
// Everything here runs on the analysis thread against mono f32 sample
// blocks. The filter stages are stateful across blocks so the stream is
// conditioned continuously, not per window.

pub mod biquad;
pub mod chain;
pub mod compressor;
pub mod spectrum;

pub use biquad::Biquad;
pub use chain::FilterChain;
pub use compressor::Compressor;
pub use spectrum::{FftProcessor, SpectrumFrame, SpectrumFrameProducer};

/// Root-mean-square level of a sample block
///
/// Accumulates in f64 so long windows do not lose precision.
/// Returns 0.0 for an empty block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}
