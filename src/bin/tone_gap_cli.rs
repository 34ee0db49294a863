use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tone_gap::audio::{AudioSource, CpalSource};
use tone_gap::testing::{FixtureSignal, FixtureSource};
use tone_gap::{
    AnalysisConfig, MissingToneResult, NoiseProfile, SessionController, SessionError, SessionPhase,
};

#[derive(Parser, Debug)]
#[command(
    name = "tone_gap_cli",
    about = "Record from a microphone or fixture and report which target tones are missing"
)]
struct Cli {
    /// Configuration file (JSON); defaults are used when absent or unreadable
    #[arg(long)]
    config: Option<PathBuf>,
    /// Drive the session from a WAV file instead of the default input device
    #[arg(long)]
    fixture: Option<PathBuf>,
    /// Playback sample rate for fixture input
    #[arg(long, default_value_t = 44_100)]
    fixture_sample_rate: u32,
    /// Override the recording duration in milliseconds
    #[arg(long)]
    record_ms: Option<u64>,
    /// Override the calibration duration in milliseconds
    #[arg(long)]
    calibration_ms: Option<u64>,
    /// Override the missing-tone decision threshold in dB
    #[arg(long)]
    threshold_db: Option<f32>,
    /// Noise profile cache: loaded before the session, saved after calibration
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Print the result as JSON instead of a table
    #[arg(long)]
    json: bool,
    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli);
    let source = build_source(&cli)?;
    let controller = SessionController::new(config, source).context("creating session")?;

    load_cached_profile(&cli, &controller)?;
    spawn_progress_printer(&controller);

    match controller.run() {
        Ok(result) => {
            save_profile_if_requested(&cli, &controller);
            emit_result(&result, cli.json)?;
            Ok(ExitCode::from(0))
        }
        Err(SessionError::NoVoiceDetected) => {
            // Calibration still succeeded; keep its profile for next time
            save_profile_if_requested(&cli, &controller);
            eprintln!("No voice detected: the recording never rose above the minimum peak magnitude.");
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err.into()),
    }
}

fn build_config(cli: &Cli) -> AnalysisConfig {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load_from_file(path),
        None => AnalysisConfig::default(),
    };
    if let Some(ms) = cli.record_ms {
        config.session.record_duration_ms = ms;
    }
    if let Some(ms) = cli.calibration_ms {
        config.session.calibration_duration_ms = ms;
    }
    if let Some(db) = cli.threshold_db {
        config.session.detection_threshold_db = db;
    }
    config
}

fn build_source(cli: &Cli) -> Result<Box<dyn AudioSource>> {
    match &cli.fixture {
        Some(path) => {
            let signal = FixtureSignal::from_wav(path)
                .with_context(|| format!("loading fixture {}", path.display()))?;
            Ok(Box::new(FixtureSource::new(cli.fixture_sample_rate, signal)))
        }
        None => {
            let source = CpalSource::new().context("opening default input device")?;
            Ok(Box::new(source))
        }
    }
}

fn load_cached_profile(cli: &Cli, controller: &SessionController) -> Result<()> {
    let Some(path) = &cli.profile else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }
    match NoiseProfile::load_from_file(path) {
        Ok(profile) => {
            log::info!("[ToneGapCli] Loaded noise profile from {}", path.display());
            controller
                .set_noise_profile(profile)
                .context("seeding cached noise profile")?;
        }
        Err(err) => {
            log::warn!(
                "[ToneGapCli] Ignoring unreadable noise profile {}: {}",
                path.display(),
                err
            );
        }
    }
    Ok(())
}

fn save_profile_if_requested(cli: &Cli, controller: &SessionController) {
    let Some(path) = &cli.profile else {
        return;
    };
    let profile = match controller.noise_profile() {
        Ok(Some(profile)) => profile,
        Ok(None) => return,
        Err(err) => {
            log::warn!("[ToneGapCli] Could not read noise profile for saving: {}", err);
            return;
        }
    };
    match profile.save_to_file(path) {
        Ok(()) => log::info!("[ToneGapCli] Saved noise profile to {}", path.display()),
        Err(err) => {
            log::warn!(
                "[ToneGapCli] Failed to save noise profile {}: {}",
                path.display(),
                err
            );
        }
    }
}

/// Human progress lines go to stderr so stdout stays parseable
fn spawn_progress_printer(controller: &SessionController) {
    let mut phase_rx = controller.subscribe_phase();
    thread::spawn(move || {
        while let Ok(phase) = phase_rx.blocking_recv() {
            match phase {
                SessionPhase::Calibrating => {
                    eprintln!("Calibrating: keep quiet while the noise profile is measured...");
                }
                SessionPhase::Recording => {
                    eprintln!("Recording: sing or play the target tones.");
                }
                SessionPhase::Done => break,
                SessionPhase::Idle | SessionPhase::Error => {}
            }
        }
    });

    let mut countdown_rx = controller.subscribe_countdown();
    thread::spawn(move || {
        while let Ok(tick) = countdown_rx.blocking_recv() {
            if tick.seconds_remaining > 0 {
                eprintln!("  {} s remaining", tick.seconds_remaining);
            }
        }
    });
}

fn emit_result(result: &MissingToneResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{:<5} {:>12} {:>10}  Status", "Note", "Frequency", "Level");
    for tone in &result.tones {
        let status = if tone.missing { "MISSING" } else { "present" };
        println!(
            "{:<5} {:>9.2} Hz {:>7.1} dB  {}",
            tone.note, tone.frequency_hz, tone.level_db, status
        );
    }
    println!();
    println!("Peak reference magnitude: {:.4}", result.peak_reference);
    if result.missing.is_empty() {
        println!("All {} target tones present.", result.tones.len());
    } else {
        println!(
            "Missing {} of {} target tones.",
            result.missing.len(),
            result.tones.len()
        );
    }
    Ok(())
}
