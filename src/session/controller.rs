// SessionController - owns one missing-tone analysis session end to end
//
// State machine: Idle -> Calibrating -> Recording -> Done/Error, with
// Done/Error -> Idle on reset. Calibration is lazy: a cached NoiseProfile
// matching the capture geometry skips straight to Recording. A calibration
// failure broadcasts Error and returns the session to Idle so the user can
// retry without a reset; a recording failure parks the session in Error
// until reset() is called.
//
// The controller exclusively owns the capture stream and the analysis
// worker for each phase and releases both on every exit path, including
// cancellation and mid-stream device failure. Cancellation (reset while
// active) is a flag the blocking waits poll; double release is a no-op
// because StreamHandle::stop is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::audio::{AudioSource, BufferPool, CaptureChannels, StreamHandle};
use crate::config::AnalysisConfig;
use crate::dsp::{FilterChain, SpectrumFrameProducer};
use crate::error::{
    log_calibration_error, log_config_error, log_session_error, CalibrationError, ErrorCode,
    SessionError,
};
use crate::profile::NoiseProfile;
use crate::session::events::{broadcast_stream, CountdownTick, WaveformFrame};
use crate::session::report::MissingToneResult;
use crate::session::worker::{spawn_calibration_worker, spawn_recording_worker};
use crate::tracker::{LevelUpdate, TargetFrequencySet, ToneEnergyTracker};

/// Lifecycle phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Calibrating,
    Recording,
    Done,
    Error,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Calibrating => "Calibrating",
            SessionPhase::Recording => "Recording",
            SessionPhase::Done => "Done",
            SessionPhase::Error => "Error",
        }
    }
}

/// Orchestrates calibration and recording over one audio source
///
/// All state is behind mutexes so observers on other threads can read the
/// phase, subscribe to events, or request a reset while `run` blocks.
pub struct SessionController {
    config: AnalysisConfig,
    source: Mutex<Box<dyn AudioSource>>,
    phase: Mutex<SessionPhase>,
    cancel: AtomicBool,
    noise_profile: Mutex<Option<NoiseProfile>>,
    result: Mutex<Option<MissingToneResult>>,
    levels_tx: broadcast::Sender<LevelUpdate>,
    countdown_tx: broadcast::Sender<CountdownTick>,
    phase_tx: broadcast::Sender<SessionPhase>,
    waveform_tx: broadcast::Sender<WaveformFrame>,
}

impl SessionController {
    /// Create a controller over a validated configuration and source
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the configuration fails validation or
    /// when a target frequency cannot be represented at the source's
    /// sample rate. Geometry problems surface here, never mid-frame.
    pub fn new(config: AnalysisConfig, source: Box<dyn AudioSource>) -> Result<Self, SessionError> {
        if let Err(e) = config.validate() {
            log_config_error(&e, "session setup");
            return Err(e.into());
        }
        if let Err(e) = TargetFrequencySet::new(
            config.spectral.target_frequencies.clone(),
            config.spectral.spectrum_window_size,
            source.sample_rate(),
        ) {
            log_config_error(&e, "session setup");
            return Err(e.into());
        }

        // Buffer sizes: levels arrive about every window/sample_rate
        // seconds, countdown once per second.
        let (levels_tx, _) = broadcast::channel(100);
        let (countdown_tx, _) = broadcast::channel(50);
        let (phase_tx, _) = broadcast::channel(16);
        let (waveform_tx, _) = broadcast::channel(100);

        Ok(SessionController {
            config,
            source: Mutex::new(source),
            phase: Mutex::new(SessionPhase::Idle),
            cancel: AtomicBool::new(false),
            noise_profile: Mutex::new(None),
            result: Mutex::new(None),
            levels_tx,
            countdown_tx,
            phase_tx,
            waveform_tx,
        })
    }

    /// Run one full session: calibrate if needed, record, evaluate
    ///
    /// Blocks for the calibration and recording durations. Returns the
    /// final decision, which is also retained for [`Self::result`].
    ///
    /// # Errors
    /// `SessionActive` if the session is not Idle. `Cancelled` if reset
    /// was requested mid-run (session lands back on Idle). Capture and
    /// calibration failures are returned after resources are released.
    pub fn run(&self) -> Result<MissingToneResult, SessionError> {
        let sample_rate = self.lock_source()?.sample_rate();
        let window = self.config.spectral.spectrum_window_size;

        // Claim the session and pick the entry phase under one lock so
        // two concurrent starts cannot both pass the Idle check.
        let cached = {
            let mut phase = self.lock_phase()?;
            if *phase != SessionPhase::Idle {
                return Err(SessionError::SessionActive {
                    phase: phase.name().to_string(),
                });
            }
            // Stale cancellation is cleared only once the session is
            // claimed; a refused start must leave a pending reset intact.
            self.cancel.store(false, Ordering::SeqCst);
            let cached = {
                let profile_guard = self.lock_profile()?;
                match profile_guard.as_ref() {
                    Some(p) if p.matches(sample_rate, window) => Some(p.clone()),
                    Some(p) => {
                        log::warn!(
                            "[SessionController] Cached noise profile is {} Hz / {} samples but capture is {} Hz / {} samples, recalibrating",
                            p.sample_rate,
                            p.window_size,
                            sample_rate,
                            window
                        );
                        None
                    }
                    None => None,
                }
            };
            *phase = if cached.is_some() {
                SessionPhase::Recording
            } else {
                SessionPhase::Calibrating
            };
            let _ = self.phase_tx.send(*phase);
            cached
        };

        let profile = match cached {
            Some(profile) => profile,
            None => match self.calibrate(sample_rate) {
                Ok(profile) => {
                    self.set_phase(SessionPhase::Recording);
                    profile
                }
                Err(e) => {
                    if matches!(e, SessionError::Cancelled) {
                        self.set_phase(SessionPhase::Idle);
                    } else {
                        log_session_error(&e, "calibrate");
                        // Calibration failures are retryable without a
                        // reset: broadcast Error, then land on Idle.
                        self.set_phase(SessionPhase::Error);
                        self.set_phase(SessionPhase::Idle);
                    }
                    return Err(e);
                }
            },
        };

        match self.record(sample_rate, profile) {
            Ok(result) => {
                self.set_phase(SessionPhase::Done);
                Ok(result)
            }
            Err(e) => {
                if matches!(e, SessionError::Cancelled) {
                    self.set_phase(SessionPhase::Idle);
                } else {
                    log_session_error(&e, "record");
                    self.set_phase(SessionPhase::Error);
                }
                Err(e)
            }
        }
    }

    /// Request cancellation of an active session, or clear a finished one
    ///
    /// Active sessions transition to Idle on their own thread once the
    /// cancellation is observed; `run` returns `Cancelled`. The cached
    /// noise profile survives a reset.
    pub fn reset(&self) -> Result<(), SessionError> {
        let mut phase = self.lock_phase()?;
        match *phase {
            SessionPhase::Calibrating | SessionPhase::Recording => {
                self.cancel.store(true, Ordering::SeqCst);
            }
            SessionPhase::Idle | SessionPhase::Done | SessionPhase::Error => {
                *phase = SessionPhase::Idle;
                let _ = self.phase_tx.send(SessionPhase::Idle);
                drop(phase);
                *self.lock_result()? = None;
            }
        }
        Ok(())
    }

    /// Drop the cached noise profile so the next run recalibrates
    pub fn invalidate_calibration(&self) -> Result<(), SessionError> {
        *self.lock_profile()? = None;
        Ok(())
    }

    /// Seed the cache with a previously saved profile
    ///
    /// A profile that does not match the capture geometry is accepted but
    /// will be discarded (with a warning) when the next run starts.
    pub fn set_noise_profile(&self, profile: NoiseProfile) -> Result<(), SessionError> {
        *self.lock_profile()? = Some(profile);
        Ok(())
    }

    pub fn noise_profile(&self) -> Result<Option<NoiseProfile>, SessionError> {
        Ok(self.lock_profile()?.clone())
    }

    pub fn phase(&self) -> Result<SessionPhase, SessionError> {
        Ok(*self.lock_phase()?)
    }

    /// Result of the most recent completed run, cleared by reset
    pub fn result(&self) -> Result<Option<MissingToneResult>, SessionError> {
        Ok(self.lock_result()?.clone())
    }

    // ========================================================================
    // EVENT SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe_levels(&self) -> broadcast::Receiver<LevelUpdate> {
        self.levels_tx.subscribe()
    }

    pub fn subscribe_countdown(&self) -> broadcast::Receiver<CountdownTick> {
        self.countdown_tx.subscribe()
    }

    pub fn subscribe_phase(&self) -> broadcast::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn subscribe_waveform(&self) -> broadcast::Receiver<WaveformFrame> {
        self.waveform_tx.subscribe()
    }

    /// Stream of per-frame level updates during Recording
    pub fn levels_stream(&self) -> BoxStream<'static, LevelUpdate> {
        broadcast_stream(self.subscribe_levels())
    }

    /// Stream of once-per-second countdown ticks during Recording
    pub fn countdown_stream(&self) -> BoxStream<'static, CountdownTick> {
        broadcast_stream(self.subscribe_countdown())
    }

    /// Stream of phase transitions
    pub fn phase_stream(&self) -> BoxStream<'static, SessionPhase> {
        broadcast_stream(self.subscribe_phase())
    }

    /// Stream of display waveform frames during Recording
    pub fn waveform_stream(&self) -> BoxStream<'static, WaveformFrame> {
        broadcast_stream(self.subscribe_waveform())
    }

    // ========================================================================
    // PHASE INTERNALS
    // ========================================================================

    fn calibrate(&self, sample_rate: u32) -> Result<NoiseProfile, SessionError> {
        let window = self.config.spectral.spectrum_window_size;
        tracing::info!(
            "[SessionController] Calibrating noise profile: {} ms at {} Hz",
            self.config.session.calibration_duration_ms,
            sample_rate
        );

        let (capture, analysis) = BufferPool::new(
            self.config.audio.buffer_pool_size,
            self.config.audio.buffer_size,
        )
        .split();

        let chain = FilterChain::from_config(&self.config.filter_chain, sample_rate);
        let producer = SpectrumFrameProducer::new(chain, window);

        let worker_running = Arc::new(AtomicBool::new(true));
        let worker = spawn_calibration_worker(analysis, producer, Arc::clone(&worker_running));

        let mut stream = match self.open_source(capture) {
            Ok(stream) => stream,
            Err(e) => {
                worker_running.store(false, Ordering::SeqCst);
                let _ = worker.join();
                return Err(e);
            }
        };

        let outcome = self.wait_while_capturing(
            Duration::from_millis(self.config.session.calibration_duration_ms),
            &stream,
        );

        // Release the device and drain the worker on every exit path
        stream.stop();
        worker_running.store(false, Ordering::SeqCst);
        let accumulator = worker.join().map_err(|_| SessionError::StreamFailure {
            reason: "analysis worker panicked".to_string(),
        })?;
        outcome?;

        let profile = accumulator.finish(sample_rate, window).map_err(|e| {
            log_calibration_error(&e, "calibration finish");
            match e {
                CalibrationError::InsufficientData { frames_captured } => {
                    SessionError::InsufficientCalibration { frames_captured }
                }
                other => SessionError::StreamFailure {
                    reason: other.message(),
                },
            }
        })?;

        tracing::info!(
            "[SessionController] Calibrated {} bins over {} ms",
            profile.bins.len(),
            self.config.session.calibration_duration_ms
        );
        *self.lock_profile()? = Some(profile.clone());
        Ok(profile)
    }

    fn record(
        &self,
        sample_rate: u32,
        profile: NoiseProfile,
    ) -> Result<MissingToneResult, SessionError> {
        let window = self.config.spectral.spectrum_window_size;
        let spectrum_len = window / 2 + 1;

        let targets = TargetFrequencySet::new(
            self.config.spectral.target_frequencies.clone(),
            window,
            sample_rate,
        )?;
        let tracker = ToneEnergyTracker::new(
            targets,
            profile,
            spectrum_len,
            self.config.session.noise_floor_rms,
        )?;

        tracing::info!(
            "[SessionController] Recording {} ms at {} Hz",
            self.config.session.record_duration_ms,
            sample_rate
        );

        let (capture, analysis) = BufferPool::new(
            self.config.audio.buffer_pool_size,
            self.config.audio.buffer_size,
        )
        .split();

        let chain = FilterChain::from_config(&self.config.filter_chain, sample_rate);
        let producer = SpectrumFrameProducer::new(chain, window);

        let worker_running = Arc::new(AtomicBool::new(true));
        let worker = spawn_recording_worker(
            analysis,
            producer,
            tracker,
            self.levels_tx.clone(),
            self.waveform_tx.clone(),
            self.config.spectral.waveform_window_size,
            Arc::clone(&worker_running),
        );

        let mut stream = match self.open_source(capture) {
            Ok(stream) => stream,
            Err(e) => {
                worker_running.store(false, Ordering::SeqCst);
                let _ = worker.join();
                return Err(e);
            }
        };

        let outcome = self.run_countdown(&stream);

        stream.stop();
        worker_running.store(false, Ordering::SeqCst);
        let tracker = worker.join().map_err(|_| SessionError::StreamFailure {
            reason: "analysis worker panicked".to_string(),
        })?;
        outcome?;

        let peak = tracker.peak_reference();
        if peak < self.config.session.min_peak_magnitude {
            tracing::warn!(
                "[SessionController] Peak reference {:.4} below minimum {:.4}",
                peak,
                self.config.session.min_peak_magnitude
            );
            return Err(SessionError::NoVoiceDetected);
        }

        let result =
            MissingToneResult::from_tracker(&tracker, self.config.session.detection_threshold_db);
        tracing::info!(
            "[SessionController] {} of {} targets missing, peak reference {:.4}",
            result.missing.len(),
            result.tones.len(),
            peak
        );
        *self.lock_result()? = Some(result.clone());
        Ok(result)
    }

    fn run_countdown(&self, stream: &StreamHandle) -> Result<(), SessionError> {
        let total_ms = self.config.session.record_duration_ms;
        let mut remaining = total_ms.div_ceil(1000) as u32;
        let _ = self.countdown_tx.send(CountdownTick {
            seconds_remaining: remaining,
        });

        // First interval absorbs the sub-second remainder
        let mut interval_ms = total_ms - (remaining as u64 - 1) * 1000;
        while remaining > 0 {
            self.wait_while_capturing(Duration::from_millis(interval_ms), stream)?;
            remaining -= 1;
            let _ = self.countdown_tx.send(CountdownTick {
                seconds_remaining: remaining,
            });
            interval_ms = 1000;
        }
        Ok(())
    }

    /// Sleep through `duration` in small steps, bailing out on
    /// cancellation or stream failure
    fn wait_while_capturing(
        &self,
        duration: Duration,
        stream: &StreamHandle,
    ) -> Result<(), SessionError> {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(SessionError::Cancelled);
            }
            if stream.is_failed() {
                return Err(SessionError::StreamFailure {
                    reason: "input stream reported an error".to_string(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(Duration::from_millis(25)));
        }
    }

    fn open_source(&self, capture: CaptureChannels) -> Result<StreamHandle, SessionError> {
        self.lock_source()?.open(capture)
    }

    /// Best-effort phase transition used on paths that already carry an
    /// error; a poisoned lock is logged instead of masking that error
    fn set_phase(&self, next: SessionPhase) {
        match self.phase.lock() {
            Ok(mut phase) => {
                *phase = next;
                let _ = self.phase_tx.send(next);
            }
            Err(_) => {
                log::error!(
                    "[SessionController] Phase lock poisoned while entering {}",
                    next.name()
                );
            }
        }
    }

    fn lock_phase(&self) -> Result<MutexGuard<'_, SessionPhase>, SessionError> {
        self.phase.lock().map_err(|_| SessionError::LockPoisoned {
            component: "phase".to_string(),
        })
    }

    fn lock_profile(&self) -> Result<MutexGuard<'_, Option<NoiseProfile>>, SessionError> {
        self.noise_profile
            .lock()
            .map_err(|_| SessionError::LockPoisoned {
                component: "noise_profile".to_string(),
            })
    }

    fn lock_result(&self) -> Result<MutexGuard<'_, Option<MissingToneResult>>, SessionError> {
        self.result.lock().map_err(|_| SessionError::LockPoisoned {
            component: "result".to_string(),
        })
    }

    fn lock_source(&self) -> Result<MutexGuard<'_, Box<dyn AudioSource>>, SessionError> {
        self.source.lock().map_err(|_| SessionError::LockPoisoned {
            component: "audio_source".to_string(),
        })
    }
}
