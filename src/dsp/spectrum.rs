// Spectrum computation - Hann-windowed FFT magnitude frames
//
// This module turns the conditioned sample stream into the spectrum
// frames the calibrator and tracker consume. Windowing reduces spectral
// leakage; magnitudes are scaled so a unit-amplitude sine at a bin
// center reads ~1.0 at that bin.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::dsp::{rms, FilterChain};

/// One spectrum frame: magnitudes for bins 0..=N/2 plus the RMS of the
/// time-domain window that produced them
///
/// Frames are ephemeral; consumers read them during the callback and
/// must copy anything they keep.
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    /// Amplitude-spectrum magnitudes, length window_size / 2 + 1
    pub magnitudes: Vec<f32>,
    /// RMS of the conditioned window
    pub rms: f32,
}

impl SpectrumFrame {
    fn empty(window_size: usize) -> Self {
        Self {
            magnitudes: vec![0.0; window_size / 2 + 1],
            rms: 0.0,
        }
    }
}

/// FFT processor that computes magnitude spectra from audio windows
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window (pre-computed)
    window: Vec<f32>,
    /// Amplitude normalization: 2 / sum(window)
    scale: f32,
    /// Reused in-place FFT buffer
    buffer: Vec<Complex<f32>>,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `fft_size` - FFT window size, must be a power of two
    pub fn new(fft_size: usize) -> Self {
        // Pre-compute Hann window to reduce spectral leakage
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();
        let window_sum: f32 = window.iter().sum();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
            scale: 2.0 / window_sum,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// FFT window size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins per frame (fft_size / 2 + 1)
    pub fn spectrum_len(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute the magnitude spectrum of one window into `out`
    ///
    /// Applies Hann windowing, performs the FFT, and writes magnitudes
    /// for positive frequencies only (exploiting symmetry of the
    /// real-valued input). `audio` must be exactly `fft_size` samples.
    pub fn magnitudes_into(&mut self, audio: &[f32], out: &mut Vec<f32>) {
        debug_assert_eq!(audio.len(), self.fft_size);

        for (slot, (&sample, &w)) in self
            .buffer
            .iter_mut()
            .zip(audio.iter().zip(self.window.iter()))
        {
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft.process(&mut self.buffer);

        out.clear();
        out.extend(
            self.buffer[..self.fft_size / 2 + 1]
                .iter()
                .map(|c| c.norm() * self.scale),
        );
    }
}

/// Turns conditioned capture chunks into spectrum frames
///
/// Chunks arrive at whatever granularity the capture side delivers;
/// frames leave at one per `window_size` samples (non-overlapping
/// windows). The chain state persists across chunks so the stream is
/// filtered continuously.
pub struct SpectrumFrameProducer {
    chain: FilterChain,
    fft: FftProcessor,
    window_size: usize,
    pending: Vec<f32>,
    frame: SpectrumFrame,
}

impl SpectrumFrameProducer {
    pub fn new(chain: FilterChain, window_size: usize) -> Self {
        Self {
            chain,
            fft: FftProcessor::new(window_size),
            window_size,
            pending: Vec::with_capacity(window_size * 2),
            frame: SpectrumFrame::empty(window_size),
        }
    }

    /// Condition a capture chunk in place and queue it for windowing
    pub fn push(&mut self, chunk: &mut [f32]) {
        self.chain.process(chunk);
        self.pending.extend_from_slice(chunk);
    }

    /// Produce the next complete frame, if one window of samples is queued
    ///
    /// The returned frame is reused scratch; copy out anything kept
    /// beyond the next call.
    pub fn next_frame(&mut self) -> Option<&SpectrumFrame> {
        if self.pending.len() < self.window_size {
            return None;
        }
        self.frame.rms = rms(&self.pending[..self.window_size]);
        self.fft
            .magnitudes_into(&self.pending[..self.window_size], &mut self.frame.magnitudes);
        self.pending.drain(..self.window_size);
        Some(&self.frame)
    }

    /// Number of magnitude bins per frame
    pub fn spectrum_len(&self) -> usize {
        self.fft.spectrum_len()
    }
}
