// Session module - lifecycle orchestration for a missing-tone analysis run
//
// controller: the Idle/Calibrating/Recording/Done/Error state machine
// worker:     analysis threads that drain capture buffers into frames
// events:     broadcast event types and the stream adapter
// report:     final decision built from the tracker state

pub mod controller;
pub mod events;
pub mod report;
pub mod worker;

pub use controller::{SessionController, SessionPhase};
pub use events::{broadcast_stream, CountdownTick, WaveformFrame};
pub use report::{MissingToneResult, ToneReading, MIN_LEVEL_DB};
pub use worker::{spawn_calibration_worker, spawn_recording_worker};
