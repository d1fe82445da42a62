//! DSP engine: pure Rust voice synthesis and output.
//!
//! The same code renders live blocks for the browser's AudioWorklet (via
//! WASM) and offline bounces of a pattern.

pub mod automation;
pub mod context;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod renderer;
pub mod voice;
