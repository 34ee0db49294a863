//! End-to-end session tests over fixture sources
//!
//! These tests drive full sessions through the production capture and
//! analysis path, validating:
//! - Missing-tone decisions for partial tone mixtures
//! - NoVoiceDetected on silent recordings and the sticky Error phase
//! - Noise-profile caching across runs (recalibration skipped)
//! - Countdown, level, and waveform broadcasts during recording
//! - Cancellation via reset and mid-stream capture failure
//! - A start refused mid-session leaving a pending reset intact
//!
//! No audio hardware is required; every source is deterministic.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tone_gap::audio::{AudioSource, CaptureChannels, StreamHandle};
use tone_gap::testing::{FixtureSignal, FixtureSource, ToneComponent};
use tone_gap::{AnalysisConfig, SessionController, SessionError, SessionPhase};

const SAMPLE_RATE: u32 = 44_100;

/// Short durations so the suite stays fast; every other knob is stock
fn test_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.session.calibration_duration_ms = 300;
    config.session.record_duration_ms = 1_200;
    config
}

fn tone(frequency_hz: f32) -> ToneComponent {
    ToneComponent::new(frequency_hz, 0.5)
}

/// Test the core decision: a recording holding only A4 and B4 reports
/// the other ten targets of the octave as missing
#[test]
fn test_partial_mixture_reports_missing_tones() {
    let source = FixtureSource::scripted(
        SAMPLE_RATE,
        vec![
            FixtureSignal::Silence,
            FixtureSignal::Tones(vec![tone(440.0), tone(493.88)]),
        ],
    );
    let controller = SessionController::new(test_config(), Box::new(source))
        .expect("controller should build with default config");

    let result = controller.run().expect("session should complete");

    assert_eq!(result.tones.len(), 12, "one reading per target");
    assert_eq!(result.missing.len(), 10, "ten of twelve targets absent");

    // A4 is index 9 and B4 index 11 in the C4..B4 default ordering
    assert!(!result.tones[9].missing, "A4 was played");
    assert!(!result.tones[11].missing, "B4 was played");
    assert_eq!(result.tones[9].note, "A4");
    assert_eq!(result.tones[11].note, "B4");
    for (i, reading) in result.tones.iter().enumerate() {
        if i != 9 && i != 11 {
            assert!(reading.missing, "{} should be missing", reading.note);
        }
    }
    assert!(
        !result.missing.iter().any(|&f| (f - 440.0).abs() < 0.1),
        "440 Hz must not be listed missing"
    );

    assert_eq!(controller.phase().unwrap(), SessionPhase::Done);
    assert!(
        controller.result().unwrap().is_some(),
        "result should be retained for later queries"
    );
}

/// Test that a silent recording raises NoVoiceDetected and parks the
/// session in Error until reset
#[test]
fn test_silent_recording_reports_no_voice() {
    let source = FixtureSource::new(SAMPLE_RATE, FixtureSignal::Silence);
    let controller = SessionController::new(test_config(), Box::new(source)).unwrap();

    match controller.run() {
        Err(SessionError::NoVoiceDetected) => {}
        other => panic!("Expected NoVoiceDetected, got: {:?}", other.map(|_| ())),
    }
    assert_eq!(controller.phase().unwrap(), SessionPhase::Error);

    // A second run must be refused until the error is acknowledged
    match controller.run() {
        Err(SessionError::SessionActive { phase }) => {
            assert_eq!(phase, "Error");
        }
        other => panic!("Expected SessionActive, got: {:?}", other.map(|_| ())),
    }

    // Reset is idempotent: a second reset from Idle changes nothing
    controller.reset().unwrap();
    controller.reset().unwrap();
    assert_eq!(controller.phase().unwrap(), SessionPhase::Idle);
    assert!(controller.result().unwrap().is_none());
}

/// Test that the second run reuses the calibrated noise profile instead
/// of opening the source for another calibration pass
#[test]
fn test_cached_profile_skips_recalibration() {
    let source = FixtureSource::scripted(
        SAMPLE_RATE,
        vec![
            FixtureSignal::Silence,
            FixtureSignal::Tones(vec![tone(440.0)]),
            FixtureSignal::Tones(vec![tone(440.0)]),
        ],
    );
    let opens = source.open_counter();
    let controller = SessionController::new(test_config(), Box::new(source)).unwrap();

    // 1. First run calibrates (open #1) then records (open #2)
    controller.run().expect("first session should complete");
    assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert!(controller.noise_profile().unwrap().is_some());

    controller.reset().unwrap();

    // 2. Second run goes straight to recording (open #3 only)
    let mut phase_rx = controller.subscribe_phase();
    let result = controller.run().expect("second session should complete");
    assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 3);

    assert_eq!(phase_rx.try_recv().unwrap(), SessionPhase::Recording);
    assert_eq!(phase_rx.try_recv().unwrap(), SessionPhase::Done);

    assert_eq!(result.missing.len(), 11, "only A4 was played");
    assert!(!result.tones[9].missing);
}

/// Test countdown ticks, per-frame levels, and waveform frames while a
/// recording is in flight
#[test]
fn test_recording_broadcasts_progress() {
    let mut config = test_config();
    config.session.record_duration_ms = 2_000;

    let source = FixtureSource::scripted(
        SAMPLE_RATE,
        vec![
            FixtureSignal::Silence,
            FixtureSignal::Tones(vec![tone(440.0)]),
        ],
    );
    let controller = SessionController::new(config, Box::new(source)).unwrap();

    let mut countdown_rx = controller.subscribe_countdown();
    let mut levels_rx = controller.subscribe_levels();
    let mut waveform_rx = controller.subscribe_waveform();

    controller.run().expect("session should complete");

    let mut ticks = Vec::new();
    while let Ok(tick) = countdown_rx.try_recv() {
        ticks.push(tick.seconds_remaining);
    }
    assert_eq!(ticks, vec![2, 1, 0], "2000 ms should tick 2, 1, 0");

    let mut updates = 0;
    let mut saw_a4 = false;
    let mut last_frame_index = None;
    while let Ok(update) = levels_rx.try_recv() {
        updates += 1;
        assert_eq!(update.levels.len(), 12);
        if update.levels[9] > 0.5 {
            saw_a4 = true;
        }
        if let Some(previous) = last_frame_index {
            assert!(update.frame_index > previous, "frame indices increase");
        }
        last_frame_index = Some(update.frame_index);
    }
    assert!(updates > 0, "expected level updates during recording");
    assert!(saw_a4, "A4 level should dominate its frame");

    let mut waveforms = 0;
    let mut saw_signal = false;
    while let Ok(frame) = waveform_rx.try_recv() {
        waveforms += 1;
        if frame.rms > 0.1 {
            saw_signal = true;
        }
    }
    assert!(waveforms > 0, "expected waveform frames during recording");
    assert!(saw_signal, "waveform should carry the tone's energy");
}

/// Test cancellation: reset during an active recording makes run return
/// Cancelled and the session land on Idle with its profile intact
#[test]
fn test_reset_cancels_active_recording() {
    let mut config = test_config();
    config.session.calibration_duration_ms = 200;
    config.session.record_duration_ms = 3_000;

    let source = FixtureSource::scripted(
        SAMPLE_RATE,
        vec![
            FixtureSignal::Silence,
            FixtureSignal::Tones(vec![tone(440.0)]),
        ],
    );
    let controller = Arc::new(SessionController::new(config, Box::new(source)).unwrap());

    let runner = Arc::clone(&controller);
    let session = thread::spawn(move || runner.run());

    // Let the session get through calibration and into recording
    thread::sleep(Duration::from_millis(600));
    assert_eq!(controller.phase().unwrap(), SessionPhase::Recording);
    controller.reset().unwrap();

    match session.join().expect("session thread should not panic") {
        Err(SessionError::Cancelled) => {}
        other => panic!("Expected Cancelled, got: {:?}", other.map(|_| ())),
    }
    assert_eq!(controller.phase().unwrap(), SessionPhase::Idle);
    assert!(
        controller.noise_profile().unwrap().is_some(),
        "cancellation keeps the calibrated profile"
    );
}

/// Test that a start attempt refused while a session is active does not
/// erase a reset requested just before it: the running session must
/// still observe the cancellation
#[test]
fn test_refused_start_keeps_pending_reset() {
    let mut config = test_config();
    config.session.calibration_duration_ms = 200;
    config.session.record_duration_ms = 3_000;

    let source = FixtureSource::scripted(
        SAMPLE_RATE,
        vec![
            FixtureSignal::Silence,
            FixtureSignal::Tones(vec![tone(440.0)]),
        ],
    );
    let controller = Arc::new(SessionController::new(config, Box::new(source)).unwrap());

    let runner = Arc::clone(&controller);
    let session = thread::spawn(move || runner.run());

    // Let the session get through calibration and into recording
    thread::sleep(Duration::from_millis(600));
    assert_eq!(controller.phase().unwrap(), SessionPhase::Recording);

    // Reset, then immediately race a second start against the still
    // active session; the refusal must not touch the cancel flag
    controller.reset().unwrap();
    match controller.run() {
        Err(SessionError::SessionActive { phase }) => {
            assert_eq!(phase, "Recording");
        }
        other => panic!("Expected SessionActive, got: {:?}", other.map(|_| ())),
    }

    match session.join().expect("session thread should not panic") {
        Err(SessionError::Cancelled) => {}
        other => panic!("Expected Cancelled, got: {:?}", other.map(|_| ())),
    }
    assert_eq!(controller.phase().unwrap(), SessionPhase::Idle);
}

/// Test that a capture stream dying mid-recording surfaces as a sticky
/// StreamFailure
#[test]
fn test_stream_failure_during_recording() {
    let mut config = test_config();
    config.session.calibration_duration_ms = 200;
    config.session.record_duration_ms = 2_000;

    // Each open gets its own failure deadline: calibration (200 ms)
    // finishes first, the recording stream dies at 500 ms
    let source = FixtureSource::new(SAMPLE_RATE, FixtureSignal::Tones(vec![tone(440.0)]))
        .with_failure_after(Duration::from_millis(500));
    let controller = SessionController::new(config, Box::new(source)).unwrap();

    match controller.run() {
        Err(SessionError::StreamFailure { reason }) => {
            assert!(reason.contains("stream"), "reason: {}", reason);
        }
        other => panic!("Expected StreamFailure, got: {:?}", other.map(|_| ())),
    }
    assert_eq!(controller.phase().unwrap(), SessionPhase::Error);

    controller.reset().unwrap();
    assert_eq!(controller.phase().unwrap(), SessionPhase::Idle);
}

/// Source that serves calibration once, then reports the device gone
struct SecondOpenFails {
    inner: FixtureSource,
    opens: usize,
}

impl AudioSource for SecondOpenFails {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn open(&mut self, channels: CaptureChannels) -> Result<StreamHandle, SessionError> {
        self.opens += 1;
        if self.opens >= 2 {
            return Err(SessionError::DeviceUnavailable {
                reason: "input device disconnected".to_string(),
            });
        }
        self.inner.open(channels)
    }
}

/// Test that losing the device between calibration and recording leaves
/// the calibrated profile cached and the session in Error
#[test]
fn test_device_loss_after_calibration() {
    let source = SecondOpenFails {
        inner: FixtureSource::new(SAMPLE_RATE, FixtureSignal::Silence),
        opens: 0,
    };
    let controller = SessionController::new(test_config(), Box::new(source)).unwrap();

    match controller.run() {
        Err(SessionError::DeviceUnavailable { .. }) => {}
        other => panic!("Expected DeviceUnavailable, got: {:?}", other.map(|_| ())),
    }
    assert_eq!(controller.phase().unwrap(), SessionPhase::Error);
    assert!(
        controller.noise_profile().unwrap().is_some(),
        "calibration completed before the device vanished"
    );

    controller.reset().unwrap();
    assert_eq!(controller.phase().unwrap(), SessionPhase::Idle);
}

/// Test that noise captured during calibration is subtracted from the
/// recording: a tone present in both phases must not count as sung
#[test]
fn test_calibration_noise_is_subtracted() {
    // The same A4 tone hums through calibration and recording, plus a
    // genuinely sung C4 only during recording
    let source = FixtureSource::scripted(
        SAMPLE_RATE,
        vec![
            FixtureSignal::Tones(vec![tone(440.0)]),
            FixtureSignal::Tones(vec![tone(440.0), tone(261.63)]),
        ],
    );
    let controller = SessionController::new(test_config(), Box::new(source)).unwrap();

    let result = controller.run().expect("session should complete");

    assert!(!result.tones[0].missing, "C4 was sung over the hum");
    assert!(
        result.tones[9].missing,
        "A4 is background hum, not a sung tone"
    );
}
