//! Audio context: the output the engine fires voices into.
//!
//! Mirrors the parts of a browser `AudioContext` the synth relies on: a
//! suspended/running/closed state, a clock that only moves while running,
//! and a destination that an AudioWorklet pulls rendered blocks from.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::mixer::Mixer;
use super::voice::{Voice, VoicePlan};

/// Lifecycle of the audio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Created but not yet allowed to play (autoplay policy).
    Suspended,
    Running,
    /// Torn down; nothing can be started any more.
    Closed,
}

pub struct AudioContext {
    sample_rate: f64,
    state: ContextState,
    /// Frames rendered while running.
    frame: u64,
    mixer: Mixer,
}

impl AudioContext {
    pub fn new(sample_rate: f64) -> Result<Self, EngineError> {
        if !sample_rate.is_finite() || sample_rate < 1.0 {
            return Err(EngineError::AudioInit(format!(
                "unsupported sample rate {sample_rate}"
            )));
        }
        tracing::info!(sample_rate, "audio context created");
        Ok(AudioContext {
            sample_rate,
            state: ContextState::Suspended,
            frame: 0,
            mixer: Mixer::new(),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Context time in seconds.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        match self.state {
            ContextState::Closed => Err(EngineError::AudioUnavailable),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.state = ContextState::Running;
                tracing::info!(time = self.current_time(), "audio context resumed");
                Ok(())
            }
        }
    }

    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
            tracing::info!("audio context suspended");
        }
    }

    /// Close the context and drop every sounding voice.
    pub fn close(&mut self) {
        if self.state != ContextState::Closed {
            self.state = ContextState::Closed;
            self.mixer = Mixer::new();
            tracing::info!("audio context closed");
        }
    }

    /// Resume if suspended; fail if closed.
    pub(crate) fn ensure_running(&mut self) -> Result<(), EngineError> {
        self.resume()
    }

    /// Hand a voice to the mixer. It plays from its start time and is
    /// released once its stop time passes.
    pub fn start_voice(&mut self, plan: &VoicePlan) {
        if self.state == ContextState::Closed {
            return;
        }
        self.mixer.add(Voice::new(plan, self.sample_rate));
    }

    /// Voices currently held by the output.
    pub fn active_voices(&self) -> &[Voice] {
        self.mixer.voices()
    }

    /// Oscillators currently running across all voices.
    pub fn active_oscillators(&self) -> usize {
        self.mixer.voices().iter().map(Voice::oscillator_count).sum()
    }

    /// Pull the next block of mono samples. Writes silence and leaves the
    /// clock untouched unless running.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.state != ContextState::Running {
            out.fill(0.0);
            return;
        }
        self.mixer.render(out, self.frame);
        self.frame += out.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use crate::dsp::voice::VoiceBuilder;

    #[test]
    fn rejects_bad_sample_rate() {
        assert!(matches!(AudioContext::new(0.0), Err(EngineError::AudioInit(_))));
        assert!(matches!(AudioContext::new(f64::NAN), Err(EngineError::AudioInit(_))));
        assert!(AudioContext::new(48000.0).is_ok());
    }

    #[test]
    fn starts_suspended_with_frozen_clock() {
        let mut ctx = AudioContext::new(1000.0).unwrap();
        assert_eq!(ctx.state(), ContextState::Suspended);
        let mut out = [1.0_f32; 100];
        ctx.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(ctx.current_time(), 0.0);

        ctx.resume().unwrap();
        ctx.render(&mut out);
        assert_eq!(ctx.current_time(), 0.1);
    }

    #[test]
    fn trigger_resumes_suspended_output() {
        let mut ctx = AudioContext::new(44100.0).unwrap();
        let config = InstrumentConfig::default();
        VoiceBuilder::new(&config).trigger(&mut ctx, "C").unwrap();
        assert_eq!(ctx.state(), ContextState::Running);
        assert_eq!(ctx.active_voices().len(), 1);
        assert_eq!(ctx.active_oscillators(), 2);
    }

    #[test]
    fn closed_output_refuses_triggers() {
        let mut ctx = AudioContext::new(44100.0).unwrap();
        ctx.close();
        let config = InstrumentConfig::default();
        let err = VoiceBuilder::new(&config).trigger(&mut ctx, "C").unwrap_err();
        assert_eq!(err, EngineError::AudioUnavailable);
        assert!(ctx.active_voices().is_empty());
        assert_eq!(ctx.resume(), Err(EngineError::AudioUnavailable));
    }

    #[test]
    fn unknown_note_starts_nothing() {
        let mut ctx = AudioContext::new(44100.0).unwrap();
        let config = InstrumentConfig::default();
        let err = VoiceBuilder::new(&config).trigger(&mut ctx, "X#9").unwrap_err();
        assert_eq!(err, EngineError::UnknownNote("X#9".to_string()));
        assert!(VoiceBuilder::new(&config).trigger(&mut ctx, "").is_err());
        assert!(ctx.active_voices().is_empty());
        assert_eq!(ctx.state(), ContextState::Suspended, "unknown note must not resume");
    }

    #[test]
    fn overlapping_voices_are_independent() {
        let mut ctx = AudioContext::new(1000.0).unwrap();
        let config = InstrumentConfig::default();
        let builder = VoiceBuilder::new(&config);
        builder.trigger(&mut ctx, "C").unwrap();
        builder.trigger(&mut ctx, "C").unwrap();
        builder.trigger(&mut ctx, "E").unwrap();
        assert_eq!(ctx.active_voices().len(), 3);

        // Sustain 0.5 s at 1 kHz: all gone after 500 frames.
        let mut out = [0.0_f32; 250];
        ctx.render(&mut out);
        assert_eq!(ctx.active_voices().len(), 3);
        ctx.render(&mut out);
        assert!(ctx.active_voices().is_empty(), "stopped voices must be released");
    }
}
