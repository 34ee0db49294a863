//! Deterministic audio sources for tests and deviceless CLI runs.
//!
//! [`FixtureSource`] implements the same [`AudioSource`] trait as the cpal
//! input device, feeding synthesized or WAV-loaded PCM through the capture
//! buffer pool at wall-clock pace. A session driven by a fixture exercises
//! the identical conditioning, FFT, and tracker path as live capture, so
//! integration tests and the CLI's fixture mode need no hardware.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rtrb::PopError;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{AudioSource, CaptureChannels, StreamHandle};
use crate::error::SessionError;

/// One sinusoid in a synthesized mixture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneComponent {
    pub frequency_hz: f32,
    pub amplitude: f32,
}

impl ToneComponent {
    pub fn new(frequency_hz: f32, amplitude: f32) -> Self {
        ToneComponent {
            frequency_hz,
            amplitude,
        }
    }
}

/// What a fixture plays while its stream is open
#[derive(Debug, Clone)]
pub enum FixtureSignal {
    /// All-zero samples
    Silence,
    /// Sum of sine components, each with its own phase accumulator
    Tones(Vec<ToneComponent>),
    /// Uniform noise in [-amplitude, amplitude), seeded so runs repeat
    WhiteNoise { amplitude: f32 },
    /// Arbitrary mono PCM, looped when shorter than the stream
    Samples(Vec<f32>),
}

impl FixtureSignal {
    /// Load a WAV file as a looping [`FixtureSignal::Samples`] signal
    ///
    /// Accepts float and 16/24/32-bit integer PCM. Multi-channel files
    /// are mixed down to mono by averaging across channels. The file's
    /// own sample rate is ignored; the fixture plays the samples at the
    /// rate the [`FixtureSource`] was constructed with.
    pub fn from_wav(path: &Path) -> Result<Self, SessionError> {
        let mut reader =
            hound::WavReader::open(path).map_err(|err| SessionError::StreamOpenFailed {
                reason: format!("failed to open {}: {err}", path.display()),
            })?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(SessionError::StreamOpenFailed {
                reason: format!("{} has zero channels", path.display()),
            });
        }

        let read_err = |err: hound::Error| SessionError::StreamOpenFailed {
            reason: format!("error reading {}: {err}", path.display()),
        };

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|sample| sample.map_err(read_err))
                .collect::<Result<Vec<f32>, _>>()?,
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|sample| sample.map(|v| v as f32 / i16::MAX as f32).map_err(read_err))
                    .collect::<Result<Vec<f32>, _>>()?,
                24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|v| v as f32 / i32::MAX as f32).map_err(read_err))
                    .collect::<Result<Vec<f32>, _>>()?,
                bits => {
                    return Err(SessionError::StreamOpenFailed {
                        reason: format!(
                            "unsupported bits_per_sample={} for {}",
                            bits,
                            path.display()
                        ),
                    })
                }
            },
        };

        if spec.channels == 1 {
            return Ok(FixtureSignal::Samples(samples));
        }

        let channels = spec.channels as usize;
        let mut mono = Vec::with_capacity(samples.len() / channels);
        for frame in samples.chunks(channels) {
            let sum: f32 = frame.iter().copied().sum();
            mono.push(sum / channels as f32);
        }
        Ok(FixtureSignal::Samples(mono))
    }
}

/// Renders a [`FixtureSignal`] into capture buffers, carrying phase,
/// PRNG, and loop-cursor state across calls
struct SignalRenderer {
    signal: FixtureSignal,
    sample_rate: u32,
    phases: Vec<f32>,
    rng: StdRng,
    cursor: usize,
}

impl SignalRenderer {
    fn new(signal: FixtureSignal, sample_rate: u32) -> Self {
        let phases = match &signal {
            FixtureSignal::Tones(components) => vec![0.0; components.len()],
            _ => Vec::new(),
        };
        SignalRenderer {
            signal,
            sample_rate,
            phases,
            rng: StdRng::seed_from_u64(0x704E_47AF),
            cursor: 0,
        }
    }

    fn fill(&mut self, buffer: &mut [f32]) {
        match &self.signal {
            FixtureSignal::Silence => buffer.fill(0.0),
            FixtureSignal::Tones(components) => {
                let sample_rate = self.sample_rate as f32;
                for sample in buffer.iter_mut() {
                    let mut value = 0.0;
                    for (component, phase) in components.iter().zip(self.phases.iter_mut()) {
                        value += (2.0 * PI * *phase).sin() * component.amplitude;
                        *phase += component.frequency_hz / sample_rate;
                        if *phase >= 1.0 {
                            *phase -= 1.0;
                        }
                    }
                    *sample = value;
                }
            }
            FixtureSignal::WhiteNoise { amplitude } => {
                let amplitude = *amplitude;
                for sample in buffer.iter_mut() {
                    *sample = self.rng.gen_range(-amplitude..amplitude);
                }
            }
            FixtureSignal::Samples(samples) => {
                if samples.is_empty() {
                    buffer.fill(0.0);
                    return;
                }
                for sample in buffer.iter_mut() {
                    *sample = samples[self.cursor];
                    self.cursor = (self.cursor + 1) % samples.len();
                }
            }
        }
    }
}

/// Deterministic [`AudioSource`] backed by synthesized or loaded PCM
///
/// Each `open` starts a feeder thread that fills pool buffers from the
/// current signal and pushes them at the pace a real capture callback
/// would, so wall-clock session durations behave as they do on hardware.
/// A scripted source advances to its next signal on each `open`, which
/// lets one source play silence for calibration and tones for recording.
pub struct FixtureSource {
    sample_rate: u32,
    current: FixtureSignal,
    script: VecDeque<FixtureSignal>,
    fail_after: Option<Duration>,
    opens: Arc<AtomicUsize>,
}

impl FixtureSource {
    /// Source that plays the same signal on every open
    pub fn new(sample_rate: u32, signal: FixtureSignal) -> Self {
        FixtureSource {
            sample_rate,
            current: signal,
            script: VecDeque::new(),
            fail_after: None,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Source that plays `signals` in order, one per open, repeating the
    /// last once the script is exhausted
    ///
    /// # Panics
    /// Panics if `signals` is empty.
    pub fn scripted(sample_rate: u32, signals: Vec<FixtureSignal>) -> Self {
        assert!(
            !signals.is_empty(),
            "scripted fixture needs at least one signal"
        );
        let mut script: VecDeque<FixtureSignal> = signals.into();
        let current = script.pop_front().expect("script checked non-empty");
        FixtureSource {
            sample_rate,
            current,
            script,
            fail_after: None,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulate a capture failure: the stream raises its failed flag and
    /// stops feeding once it has been open for `after`
    pub fn with_failure_after(mut self, after: Duration) -> Self {
        self.fail_after = Some(after);
        self
    }

    /// Shared open counter, for observing the source after it is boxed
    /// and moved into a session controller
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl AudioSource for FixtureSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, mut channels: CaptureChannels) -> Result<StreamHandle, SessionError> {
        // Advance the script on re-open; the first open plays the signal
        // the source was constructed with.
        if self.opens.fetch_add(1, Ordering::SeqCst) > 0 {
            if let Some(next) = self.script.pop_front() {
                self.current = next;
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));
        let mut renderer = SignalRenderer::new(self.current.clone(), self.sample_rate);
        let sample_rate = self.sample_rate;
        let fail_after = self.fail_after;

        let thread_running = Arc::clone(&running);
        let thread_failed = Arc::clone(&failed);
        let join = thread::spawn(move || {
            let started = Instant::now();
            let mut samples_fed: u64 = 0;

            while thread_running.load(Ordering::SeqCst) {
                if let Some(after) = fail_after {
                    if started.elapsed() >= after {
                        thread_failed.store(true, Ordering::SeqCst);
                        break;
                    }
                }

                let mut buffer = match channels.pool_consumer.pop() {
                    Ok(buf) => buf,
                    Err(PopError::Empty) => {
                        if !thread_running.load(Ordering::SeqCst) {
                            break;
                        }
                        thread::sleep(Duration::from_micros(200));
                        continue;
                    }
                };

                renderer.fill(&mut buffer);
                samples_fed += buffer.len() as u64;

                if channels.data_producer.push(buffer).is_err() {
                    break;
                }

                // Pace delivery like a capture callback: never run ahead
                // of the wall-clock position of the samples fed so far.
                let due = Duration::from_secs_f64(samples_fed as f64 / sample_rate as f64);
                let elapsed = started.elapsed();
                if due > elapsed {
                    thread::sleep(due - elapsed);
                }
            }
        });

        Ok(StreamHandle::new(running, failed, join))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferPool;
    use crate::dsp;

    #[test]
    fn renderer_sine_has_expected_rms() {
        let mut renderer = SignalRenderer::new(
            FixtureSignal::Tones(vec![ToneComponent::new(440.0, 0.5)]),
            44_100,
        );
        let mut buffer = vec![0.0_f32; 44_100];
        renderer.fill(&mut buffer);

        // RMS of a sine is amplitude / sqrt(2)
        let rms = dsp::rms(&buffer);
        assert!((rms - 0.3536).abs() < 0.01, "rms was {}", rms);
    }

    #[test]
    fn renderer_silence_is_all_zero() {
        let mut renderer = SignalRenderer::new(FixtureSignal::Silence, 44_100);
        let mut buffer = vec![1.0_f32; 512];
        renderer.fill(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn renderer_noise_is_bounded_and_deterministic() {
        let mut a = SignalRenderer::new(FixtureSignal::WhiteNoise { amplitude: 0.3 }, 44_100);
        let mut b = SignalRenderer::new(FixtureSignal::WhiteNoise { amplitude: 0.3 }, 44_100);
        let mut buf_a = vec![0.0_f32; 2048];
        let mut buf_b = vec![0.0_f32; 2048];
        a.fill(&mut buf_a);
        b.fill(&mut buf_b);

        assert_eq!(buf_a, buf_b);
        assert!(buf_a.iter().all(|s| s.abs() <= 0.3));
        assert!(buf_a.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn renderer_samples_loop_around() {
        let mut renderer =
            SignalRenderer::new(FixtureSignal::Samples(vec![0.1, 0.2, 0.3]), 44_100);
        let mut buffer = vec![0.0_f32; 7];
        renderer.fill(&mut buffer);
        assert_eq!(buffer, vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
    }

    #[test]
    fn wav_loading_mixes_stereo_to_mono() {
        let path = std::env::temp_dir().join(format!(
            "tone_gap_fixture_stereo_{}.wav",
            std::process::id()
        ));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // Left 0.4, right 0.2: mono mixdown should land near 0.3
        for _ in 0..64 {
            writer.write_sample((0.4 * i16::MAX as f32) as i16).unwrap();
            writer.write_sample((0.2 * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let signal = FixtureSignal::from_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        match signal {
            FixtureSignal::Samples(samples) => {
                assert_eq!(samples.len(), 64);
                for sample in samples {
                    assert!((sample - 0.3).abs() < 1e-3, "sample was {}", sample);
                }
            }
            other => panic!("Expected Samples, got: {:?}", other),
        }
    }

    #[test]
    fn from_wav_missing_file_is_open_failure() {
        let path = std::env::temp_dir().join("tone_gap_fixture_missing.wav");
        match FixtureSignal::from_wav(&path) {
            Err(SessionError::StreamOpenFailed { .. }) => {}
            other => panic!("Expected StreamOpenFailed, got: {:?}", other),
        }
    }

    #[test]
    fn open_feeds_buffers_through_the_pool() {
        let (capture, mut analysis) = BufferPool::new(4, 256).split();
        let mut source = FixtureSource::new(
            44_100,
            FixtureSignal::Tones(vec![ToneComponent::new(440.0, 0.5)]),
        );

        let mut stream = source.open(capture).unwrap();
        thread::sleep(Duration::from_millis(60));
        stream.stop();

        let mut buffers = 0;
        let mut saw_signal = false;
        while let Ok(buffer) = analysis.data_consumer.pop() {
            buffers += 1;
            if buffer.iter().any(|s| s.abs() > 0.1) {
                saw_signal = true;
            }
            let _ = analysis.pool_producer.push(buffer);
        }

        assert!(buffers > 0, "feeder produced no buffers");
        assert!(saw_signal, "feeder produced only silence");
        assert_eq!(source.open_count(), 1);
    }

    #[test]
    fn scripted_source_advances_per_open() {
        let mut source = FixtureSource::scripted(
            44_100,
            vec![
                FixtureSignal::Silence,
                FixtureSignal::Tones(vec![ToneComponent::new(440.0, 0.5)]),
            ],
        );

        // 1. First open plays silence
        let (capture, mut analysis) = BufferPool::new(4, 256).split();
        let mut stream = source.open(capture).unwrap();
        thread::sleep(Duration::from_millis(40));
        stream.stop();
        while let Ok(buffer) = analysis.data_consumer.pop() {
            assert!(buffer.iter().all(|&s| s == 0.0), "expected silence");
        }

        // 2. Second open plays the tone; the script stays on it after
        for _ in 0..2 {
            let (capture, mut analysis) = BufferPool::new(4, 256).split();
            let mut stream = source.open(capture).unwrap();
            thread::sleep(Duration::from_millis(40));
            stream.stop();
            let mut saw_signal = false;
            while let Ok(buffer) = analysis.data_consumer.pop() {
                if buffer.iter().any(|s| s.abs() > 0.1) {
                    saw_signal = true;
                }
            }
            assert!(saw_signal, "expected tone output");
        }

        assert_eq!(source.open_count(), 3);
    }

    #[test]
    fn failure_deadline_raises_failed_flag() {
        let (capture, _analysis) = BufferPool::new(4, 256).split();
        let mut source = FixtureSource::new(44_100, FixtureSignal::Silence)
            .with_failure_after(Duration::from_millis(5));

        let stream = source.open(capture).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(stream.is_failed());
    }
}
