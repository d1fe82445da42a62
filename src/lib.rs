pub mod clock;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod notes;
pub mod sequencer;
pub mod web;

use wasm_bindgen::prelude::*;

pub use crate::config::{ConfigPatch, FilterMode, InstrumentConfig, OctaveMode, OscillatorSlot};
pub use crate::dsp::oscillator::Waveform;
pub use crate::engine::{Engine, EngineEvent, EngineSnapshot};
pub use crate::error::EngineError;
pub use crate::notes::Note;
pub use crate::sequencer::StepSequencer;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the pocketsynth-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: frequency in Hz for a note name, or `undefined` if unknown.
#[wasm_bindgen]
pub fn note_frequency(name: &str) -> Option<f64> {
    notes::note_to_frequency(name)
}
