// Tone Gap - Missing-Tone Analysis Engine
// Finds which target pitches a live recording lacks, via a lock-free
// capture pipeline, noise-profile calibration, and FFT energy tracking

// Module declarations
pub mod audio;
pub mod config;
pub mod dsp;
pub mod error;
pub mod profile;
pub mod session;
pub mod testing;
pub mod tracker;

// Re-exports for convenience
pub use config::AnalysisConfig;
pub use error::{CalibrationError, ConfigError, ErrorCode, SessionError};
pub use profile::NoiseProfile;
pub use session::{
    CountdownTick, MissingToneResult, SessionController, SessionPhase, ToneReading, WaveformFrame,
};
pub use tracker::{equal_tempered_octave_frequencies, LevelUpdate, ToneEnergyTracker};
