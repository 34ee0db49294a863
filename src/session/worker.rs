// Analysis-thread workers for the two capture phases
//
// Both workers run the same loop shape: pop a filled buffer from the
// lock-free data queue, feed it to the spectrum producer, return the
// buffer to the pool immediately, then handle every complete frame the
// producer yields. When the queue is empty and the running flag has been
// cleared the worker drains out and returns its accumulated state to the
// controller through the thread's join handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::PopError;
use tokio::sync::broadcast;

use crate::audio::AnalysisChannels;
use crate::dsp::{self, SpectrumFrameProducer};
use crate::profile::NoiseProfileAccumulator;
use crate::session::events::WaveformFrame;
use crate::tracker::{LevelUpdate, ToneEnergyTracker};

/// Collects spectrum frames into per-bin sums during calibration
pub struct CalibrationWorker {
    channels: AnalysisChannels,
    producer: SpectrumFrameProducer,
    accumulator: NoiseProfileAccumulator,
    running: Arc<AtomicBool>,
}

impl CalibrationWorker {
    pub fn new(
        channels: AnalysisChannels,
        producer: SpectrumFrameProducer,
        running: Arc<AtomicBool>,
    ) -> Self {
        let accumulator = NoiseProfileAccumulator::new(producer.spectrum_len());
        CalibrationWorker {
            channels,
            producer,
            accumulator,
            running,
        }
    }

    fn run(mut self) -> NoiseProfileAccumulator {
        tracing::info!("[CalibrationWorker] Starting calibration loop");

        loop {
            let mut buffer = match self.channels.data_consumer.pop() {
                Ok(buf) => buf,
                Err(PopError::Empty) => {
                    // Check the running flag only when the queue is
                    // drained so no captured buffer is lost at shutdown.
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
            };

            self.producer.push(&mut buffer);

            // Return buffer to pool immediately
            if self.channels.pool_producer.push(buffer).is_err() {
                tracing::warn!("[CalibrationWorker] Pool queue full, dropping buffer");
            }

            while let Some(frame) = self.producer.next_frame() {
                self.accumulator.add_frame(&frame.magnitudes);
            }
        }

        tracing::info!(
            "[CalibrationWorker] Captured {} frames",
            self.accumulator.frames()
        );
        self.accumulator
    }
}

/// Feeds spectrum frames to the tracker during recording
///
/// Also taps the raw (pre-conditioning) samples for the display waveform:
/// one [`WaveformFrame`] per waveform window, published on a broadcast
/// channel nothing in the analysis path reads back.
pub struct RecordingWorker {
    channels: AnalysisChannels,
    producer: SpectrumFrameProducer,
    tracker: ToneEnergyTracker,
    levels_tx: broadcast::Sender<LevelUpdate>,
    waveform_tx: broadcast::Sender<WaveformFrame>,
    waveform_window: usize,
    waveform_pending: Vec<f32>,
    running: Arc<AtomicBool>,
}

impl RecordingWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channels: AnalysisChannels,
        producer: SpectrumFrameProducer,
        tracker: ToneEnergyTracker,
        levels_tx: broadcast::Sender<LevelUpdate>,
        waveform_tx: broadcast::Sender<WaveformFrame>,
        waveform_window: usize,
        running: Arc<AtomicBool>,
    ) -> Self {
        RecordingWorker {
            channels,
            producer,
            tracker,
            levels_tx,
            waveform_tx,
            waveform_window,
            waveform_pending: Vec::with_capacity(waveform_window * 2),
            running,
        }
    }

    fn run(mut self) -> ToneEnergyTracker {
        tracing::info!("[RecordingWorker] Starting recording loop");

        loop {
            let mut buffer = match self.channels.data_consumer.pop() {
                Ok(buf) => buf,
                Err(PopError::Empty) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
            };

            // Waveform taps the samples before the chain conditions them
            self.waveform_pending.extend_from_slice(&buffer);

            self.producer.push(&mut buffer);

            // Return buffer to pool immediately
            if self.channels.pool_producer.push(buffer).is_err() {
                tracing::warn!("[RecordingWorker] Pool queue full, dropping buffer");
            }

            while self.waveform_pending.len() >= self.waveform_window {
                let window = &self.waveform_pending[..self.waveform_window];
                let frame = WaveformFrame {
                    rms: dsp::rms(window),
                    peak: window.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs())),
                };
                let _ = self.waveform_tx.send(frame);
                self.waveform_pending.drain(..self.waveform_window);
            }

            while let Some(frame) = self.producer.next_frame() {
                let update = self.tracker.on_frame(frame);
                let _ = self.levels_tx.send(update);
            }
        }

        tracing::info!(
            "[RecordingWorker] Processed {} frames, peak reference {:.4}",
            self.tracker.frames_seen(),
            self.tracker.peak_reference()
        );
        self.tracker
    }
}

/// Spawn the calibration worker; join to collect the accumulator
pub fn spawn_calibration_worker(
    channels: AnalysisChannels,
    producer: SpectrumFrameProducer,
    running: Arc<AtomicBool>,
) -> JoinHandle<NoiseProfileAccumulator> {
    thread::spawn(move || CalibrationWorker::new(channels, producer, running).run())
}

/// Spawn the recording worker; join to collect the tracker
#[allow(clippy::too_many_arguments)]
pub fn spawn_recording_worker(
    channels: AnalysisChannels,
    producer: SpectrumFrameProducer,
    tracker: ToneEnergyTracker,
    levels_tx: broadcast::Sender<LevelUpdate>,
    waveform_tx: broadcast::Sender<WaveformFrame>,
    waveform_window: usize,
    running: Arc<AtomicBool>,
) -> JoinHandle<ToneEnergyTracker> {
    thread::spawn(move || {
        RecordingWorker::new(
            channels,
            producer,
            tracker,
            levels_tx,
            waveform_tx,
            waveform_window,
            running,
        )
        .run()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferPool;
    use crate::dsp::FilterChain;
    use crate::profile::NoiseProfile;
    use crate::tracker::TargetFrequencySet;

    const SAMPLE_RATE: u32 = 44_100;
    const WINDOW: usize = 1024;

    fn sine_buffer(frequency: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    fn producer() -> SpectrumFrameProducer {
        SpectrumFrameProducer::new(FilterChain::identity(), WINDOW)
    }

    #[test]
    fn calibration_worker_drains_queue_after_stop() {
        let (mut capture, analysis) = BufferPool::new(4, WINDOW).split();

        // Two full windows queued before the worker even starts
        for _ in 0..2 {
            let mut buffer = capture.pool_consumer.pop().unwrap();
            buffer.clear();
            buffer.extend_from_slice(&sine_buffer(440.0, 0.1, WINDOW));
            capture.data_producer.push(buffer).unwrap();
        }

        // Flag already cleared: the worker must still process both buffers
        let running = Arc::new(AtomicBool::new(false));
        let worker = CalibrationWorker::new(analysis, producer(), running);
        let accumulator = worker.run();

        assert_eq!(accumulator.frames(), 2);
    }

    #[test]
    fn recording_worker_tracks_and_publishes() {
        let (mut capture, analysis) = BufferPool::new(4, WINDOW).split();

        // Bin-centered tone so the magnitude lands in one bin:
        // bin 10 at 1024/44100 is 430.66 Hz
        let frequency = 10.0 * SAMPLE_RATE as f32 / WINDOW as f32;
        let mut buffer = capture.pool_consumer.pop().unwrap();
        buffer.clear();
        buffer.extend_from_slice(&sine_buffer(frequency, 0.5, WINDOW));
        capture.data_producer.push(buffer).unwrap();

        let targets = TargetFrequencySet::new(vec![frequency], WINDOW, SAMPLE_RATE).unwrap();
        let profile = NoiseProfile {
            bins: vec![0.0; WINDOW / 2 + 1],
            sample_rate: SAMPLE_RATE,
            window_size: WINDOW,
        };
        let tracker = ToneEnergyTracker::new(targets, profile, WINDOW / 2 + 1, 0.02).unwrap();

        let (levels_tx, mut levels_rx) = broadcast::channel(16);
        let (waveform_tx, mut waveform_rx) = broadcast::channel(16);

        let running = Arc::new(AtomicBool::new(false));
        let worker = RecordingWorker::new(
            analysis,
            producer(),
            tracker,
            levels_tx,
            waveform_tx,
            512,
            running,
        );
        let tracker = worker.run();

        assert_eq!(tracker.frames_seen(), 1);
        assert!(
            (tracker.maxima()[0] - 0.5).abs() < 0.05,
            "sine at amplitude 0.5 should read ~0.5, got {}",
            tracker.maxima()[0]
        );

        let update = levels_rx.try_recv().expect("one level update per frame");
        assert!(!update.gated);
        assert_eq!(update.levels.len(), 1);

        // 1024 raw samples with a 512 waveform window = 2 frames
        let first = waveform_rx.try_recv().expect("first waveform frame");
        assert!(first.peak > 0.4 && first.peak <= 0.5);
        assert!(waveform_rx.try_recv().is_ok(), "second waveform frame");
        assert!(waveform_rx.try_recv().is_err());
    }

    #[test]
    fn recording_worker_returns_buffers_to_pool() {
        let (mut capture, analysis) = BufferPool::new(2, WINDOW).split();

        for _ in 0..2 {
            let mut buffer = capture.pool_consumer.pop().unwrap();
            buffer.clear();
            buffer.extend_from_slice(&sine_buffer(440.0, 0.1, WINDOW));
            capture.data_producer.push(buffer).unwrap();
        }
        assert!(capture.pool_consumer.pop().is_err(), "pool exhausted");

        let targets = TargetFrequencySet::new(vec![440.0], WINDOW, SAMPLE_RATE).unwrap();
        let profile = NoiseProfile {
            bins: vec![0.0; WINDOW / 2 + 1],
            sample_rate: SAMPLE_RATE,
            window_size: WINDOW,
        };
        let tracker = ToneEnergyTracker::new(targets, profile, WINDOW / 2 + 1, 0.02).unwrap();
        let (levels_tx, _levels_rx) = broadcast::channel(16);
        let (waveform_tx, _waveform_rx) = broadcast::channel(16);

        let running = Arc::new(AtomicBool::new(false));
        let worker = RecordingWorker::new(
            analysis,
            producer(),
            tracker,
            levels_tx,
            waveform_tx,
            512,
            running,
        );
        worker.run();

        assert!(capture.pool_consumer.pop().is_ok());
        assert!(capture.pool_consumer.pop().is_ok());
    }
}
