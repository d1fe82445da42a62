//! Voice: every oscillator, gain and filter node created for one note.
//!
//! Building a voice is split in two: [`VoiceBuilder`] turns a note and an
//! [`InstrumentConfig`] into a [`VoicePlan`] (a plain description of the node
//! graph), and [`Voice`] renders that plan sample by sample inside the mixer.

use crate::config::{FilterMode, InstrumentConfig, OSCILLATOR_GAIN};
use crate::error::EngineError;
use crate::notes::Note;

use super::automation::ParamTimeline;
use super::context::AudioContext;
use super::filter::{BiquadFilter, FilterType};
use super::oscillator::{Oscillator, Waveform};

pub const LOWPASS_CUTOFF_HZ: f64 = 800.0;
pub const LOWPASS_Q: f64 = 10.0;
pub const HIGHPASS_CUTOFF_HZ: f64 = 600.0;
pub const HIGHPASS_Q: f64 = 10.0;
pub const SWEEP_START_HZ: f64 = 2000.0;
pub const SWEEP_END_HZ: f64 = 200.0;
pub const SWEEP_SECONDS: f64 = 0.5;
pub const SWEEP_Q: f64 = 15.0;

/// Fade applied just before the stop deadline.
const DECLICK_SECONDS: f64 = 0.003;
/// Frames between cutoff refreshes on automated filters.
const CUTOFF_UPDATE_INTERVAL: u64 = 16;

/// Filter inserted between an oscillator's sub-mix gain and the master gain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    pub filter_type: FilterType,
    pub q: f64,
    pub cutoff: ParamTimeline,
}

impl FilterPlan {
    fn for_mode(mode: FilterMode, start_time: f64) -> Option<FilterPlan> {
        let (filter_type, q, cutoff) = match mode {
            FilterMode::None => return None,
            FilterMode::Lowpass => (
                FilterType::Lowpass,
                LOWPASS_Q,
                ParamTimeline::new(LOWPASS_CUTOFF_HZ),
            ),
            FilterMode::Highpass => (
                FilterType::Highpass,
                HIGHPASS_Q,
                ParamTimeline::new(HIGHPASS_CUTOFF_HZ),
            ),
            FilterMode::Sweep => {
                let mut cutoff = ParamTimeline::new(SWEEP_START_HZ);
                cutoff
                    .set_value_at_time(SWEEP_START_HZ, start_time)
                    .linear_ramp_to_value_at_time(SWEEP_END_HZ, start_time + SWEEP_SECONDS);
                (FilterType::Lowpass, SWEEP_Q, cutoff)
            }
        };
        Some(FilterPlan { filter_type, q, cutoff })
    }

    /// Cutoff frequency in Hz at context time `time`.
    pub fn cutoff_at(&self, time: f64) -> f64 {
        self.cutoff.value_at(time)
    }
}

/// One oscillator and its private gain/filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialPlan {
    /// Oscillator slot, 0-based.
    pub slot: usize,
    /// True for the octaver's extra copy of slots 1 and 2.
    pub octave_copy: bool,
    pub waveform: Waveform,
    pub frequency: f64,
    pub gain: f64,
    pub filter: Option<FilterPlan>,
}

/// The complete node graph for one triggered note.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePlan {
    pub note: Note,
    pub base_frequency: f64,
    pub master_gain: f64,
    /// Context time the oscillators start, in seconds.
    pub start_time: f64,
    /// Context time every oscillator is stopped.
    pub stop_time: f64,
    pub partials: Vec<PartialPlan>,
}

impl VoicePlan {
    pub fn oscillator_count(&self) -> usize {
        self.partials.len()
    }
}

/// Builds voices from a configuration snapshot. Holds no state of its own,
/// so overlapping triggers never interfere.
#[derive(Debug, Clone, Copy)]
pub struct VoiceBuilder<'a> {
    config: &'a InstrumentConfig,
}

impl<'a> VoiceBuilder<'a> {
    pub fn new(config: &'a InstrumentConfig) -> Self {
        VoiceBuilder { config }
    }

    /// Describe the voice for `note` starting at `start_time`.
    pub fn build(&self, note: Note, start_time: f64) -> VoicePlan {
        let config = self.config;
        let base_frequency = note.frequency();
        let mut partials = Vec::with_capacity(8);

        let mut push = |slot: usize, frequency: f64, octave_copy: bool| {
            let osc = &config.oscillators[slot];
            let Some(ratio) = config.slot_ratio(slot).filter(|_| osc.enabled) else {
                return;
            };
            partials.push(PartialPlan {
                slot,
                octave_copy,
                waveform: osc.waveform,
                frequency: frequency * ratio,
                gain: OSCILLATOR_GAIN,
                filter: FilterPlan::for_mode(config.filter_mode, start_time),
            });
        };

        for slot in 0..config.oscillators.len() {
            push(slot, base_frequency, false);
        }
        // Only slots 1 and 2 get octave copies.
        if let Some(mult) = config.octave_mode.multiplier() {
            for slot in 0..2 {
                push(slot, base_frequency * mult, true);
            }
        }

        VoicePlan {
            note,
            base_frequency,
            master_gain: config.master_volume,
            start_time,
            stop_time: start_time + config.sustain_seconds,
            partials,
        }
    }

    /// Resolve `name`, then build and start its voice on `ctx`.
    pub fn trigger(&self, ctx: &mut AudioContext, name: &str) -> Result<(), EngineError> {
        let note = Note::parse(name).ok_or_else(|| EngineError::UnknownNote(name.to_string()))?;
        self.trigger_note(ctx, note)
    }

    /// Build and start a voice for an already resolved note.
    pub fn trigger_note(&self, ctx: &mut AudioContext, note: Note) -> Result<(), EngineError> {
        ctx.ensure_running()?;
        let plan = self.build(note, ctx.current_time());
        tracing::debug!(
            note = note.name(),
            oscillators = plan.oscillator_count(),
            time = plan.start_time,
            "voice triggered"
        );
        ctx.start_voice(&plan);
        Ok(())
    }
}

struct PartialVoice {
    oscillator: Oscillator,
    gain: f64,
    filter: Option<(BiquadFilter, ParamTimeline)>,
}

/// A playing voice. Renders until its stop frame, then reports finished so
/// the mixer can drop it.
pub struct Voice {
    note: Note,
    partials: Vec<PartialVoice>,
    master_gain: f64,
    start_frame: u64,
    stop_frame: u64,
    fade_frames: u64,
    sample_rate: f64,
}

impl Voice {
    pub fn new(plan: &VoicePlan, sample_rate: f64) -> Self {
        let start_frame = (plan.start_time * sample_rate).round() as u64;
        let stop_frame = ((plan.stop_time * sample_rate).round() as u64).max(start_frame);
        let fade_frames = ((DECLICK_SECONDS * sample_rate) as u64)
            .min((stop_frame - start_frame) / 2)
            .max(1);

        let partials = plan
            .partials
            .iter()
            .map(|p| PartialVoice {
                oscillator: Oscillator::new(p.waveform, p.frequency, sample_rate),
                gain: p.gain,
                filter: p.filter.as_ref().map(|f| {
                    let biquad = BiquadFilter::new(
                        f.filter_type,
                        f.cutoff_at(plan.start_time),
                        f.q,
                        sample_rate,
                    );
                    (biquad, f.cutoff.clone())
                }),
            })
            .collect();

        Voice {
            note: plan.note,
            partials,
            master_gain: plan.master_gain,
            start_frame,
            stop_frame,
            fade_frames,
            sample_rate,
        }
    }

    pub fn note(&self) -> Note {
        self.note
    }

    pub fn oscillator_count(&self) -> usize {
        self.partials.len()
    }

    /// Frame at which every oscillator stops.
    pub fn stop_frame(&self) -> u64 {
        self.stop_frame
    }

    pub fn is_finished(&self, frame: u64) -> bool {
        frame >= self.stop_frame
    }

    /// Render the voice's output for absolute context frame `frame`.
    pub fn render_frame(&mut self, frame: u64) -> f64 {
        if frame < self.start_frame || frame >= self.stop_frame {
            return 0.0;
        }

        let refresh_cutoff = (frame - self.start_frame) % CUTOFF_UPDATE_INTERVAL == 0;
        let time = frame as f64 / self.sample_rate;

        let mut sum = 0.0;
        for partial in &mut self.partials {
            let mut s = partial.oscillator.next_sample() * partial.gain;
            if let Some((filter, cutoff)) = partial.filter.as_mut() {
                if refresh_cutoff && !cutoff.is_constant() {
                    filter.set_frequency(cutoff.value_at(time));
                }
                s = filter.process(s);
            }
            sum += s;
        }

        let remaining = self.stop_frame - frame;
        let declick = (remaining as f64 / self.fade_frames as f64).min(1.0);
        sum * self.master_gain * declick
    }
}
