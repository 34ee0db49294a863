// Conditioning filter chain - fixed-order stages with per-stage bypass
//
// Order: high-pass, low-pass, notch, compressor. A disabled stage is
// simply absent; an all-disabled chain is the identity transform.

use crate::config::FilterChainConfig;
use crate::dsp::{Biquad, Compressor};

/// Q for the high-pass and low-pass sections (Butterworth response)
const EDGE_FILTER_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// The capture conditioning chain
///
/// Runs continuously over the sample stream ahead of windowing, so the
/// filter state carries across capture chunks. Both calibration and
/// recording use the same construction; the noise profile then describes
/// the floor the tracker actually sees.
pub struct FilterChain {
    high_pass: Option<Biquad>,
    low_pass: Option<Biquad>,
    notch: Option<Biquad>,
    compressor: Option<Compressor>,
}

impl FilterChain {
    /// Build the chain described by `config` for the given sample rate
    ///
    /// The config must already be validated; construction does not
    /// re-check parameter ranges.
    pub fn from_config(config: &FilterChainConfig, sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let high_pass = config
            .highpass_enabled
            .then(|| Biquad::high_pass(sample_rate, config.highpass_cutoff_hz, EDGE_FILTER_Q));
        let low_pass = config
            .lowpass_enabled
            .then(|| Biquad::low_pass(sample_rate, config.lowpass_cutoff_hz, EDGE_FILTER_Q));
        let notch = config
            .notch_enabled
            .then(|| Biquad::notch(sample_rate, config.notch_center_hz, config.notch_q));
        let compressor = config.compressor_enabled.then(|| {
            Compressor::new(
                sample_rate,
                config.compressor_threshold_db,
                config.compressor_ratio,
                config.compressor_attack_ms,
                config.compressor_release_ms,
            )
        });

        Self {
            high_pass,
            low_pass,
            notch,
            compressor,
        }
    }

    /// A chain with every stage bypassed
    pub fn identity() -> Self {
        Self {
            high_pass: None,
            low_pass: None,
            notch: None,
            compressor: None,
        }
    }

    /// Condition a block in place
    pub fn process(&mut self, samples: &mut [f32]) {
        if let Some(filter) = &mut self.high_pass {
            filter.process(samples);
        }
        if let Some(filter) = &mut self.low_pass {
            filter.process(samples);
        }
        if let Some(filter) = &mut self.notch {
            filter.process(samples);
        }
        if let Some(compressor) = &mut self.compressor {
            compressor.process(samples);
        }
    }

    /// Clear all stage state (start of a new capture)
    pub fn reset(&mut self) {
        if let Some(filter) = &mut self.high_pass {
            filter.reset();
        }
        if let Some(filter) = &mut self.low_pass {
            filter.reset();
        }
        if let Some(filter) = &mut self.notch {
            filter.reset();
        }
        if let Some(compressor) = &mut self.compressor {
            compressor.reset();
        }
    }
}
