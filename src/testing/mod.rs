//! Deterministic audio fixtures for tests and deviceless runs.
//!
//! Everything here drives the production capture and analysis path
//! through the [`crate::audio::AudioSource`] seam, so sessions can be
//! exercised end to end without an input device.

pub mod fixtures;

pub use fixtures::{FixtureSignal, FixtureSource, ToneComponent};
