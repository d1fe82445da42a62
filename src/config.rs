//! Instrument configuration: the knob and switch state the UI mutates and
//! the voice builder reads at trigger time.

use serde::{Deserialize, Serialize};

use crate::dsp::oscillator::Waveform;
use crate::error::EngineError;

/// Number of oscillator slots on the instrument.
pub const SLOT_COUNT: usize = 4;

/// Sub-mix gain applied to every oscillator before filtering.
pub const OSCILLATOR_GAIN: f64 = 0.25;

/// Fixed frequency ratios for slots 1, 3 and 4. Slot 2 follows
/// [`InstrumentConfig::detune_ratio`].
const FIXED_SLOT_RATIOS: [f64; SLOT_COUNT] = [1.000, 1.000, 0.998, 1.002];

/// Values on the detune dial.
pub const DETUNE_STEPS: [f64; 5] = [1.00, 1.005, 1.01, 1.02, 1.03];
/// Values on the volume dial.
pub const VOLUME_STEPS: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 1.0];
/// Values on the sustain dial, in seconds.
pub const SUSTAIN_STEPS: [f64; 6] = [0.1, 0.3, 0.5, 1.0, 2.0, 4.0];
/// Values on the tempo dial, in BPM.
pub const TEMPO_STEPS: [u32; 5] = [80, 100, 120, 140, 160];

/// Filter applied to each oscillator's sub-mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    None,
    Lowpass,
    Highpass,
    /// Resonant low-pass whose cutoff falls from 2 kHz to 200 Hz.
    Sweep,
}

impl FilterMode {
    pub fn next(self) -> FilterMode {
        match self {
            FilterMode::None => FilterMode::Lowpass,
            FilterMode::Lowpass => FilterMode::Highpass,
            FilterMode::Highpass => FilterMode::Sweep,
            FilterMode::Sweep => FilterMode::None,
        }
    }
}

/// Octaver switch: adds an octave copy of slots 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OctaveMode {
    Down,
    #[default]
    Off,
    Up,
}

impl OctaveMode {
    /// Three-position switch order: down, off, up, then back to down.
    pub fn next(self) -> OctaveMode {
        match self {
            OctaveMode::Down => OctaveMode::Off,
            OctaveMode::Off => OctaveMode::Up,
            OctaveMode::Up => OctaveMode::Down,
        }
    }

    /// Frequency multiplier for the octave copy, `None` when switched off.
    pub fn multiplier(self) -> Option<f64> {
        match self {
            OctaveMode::Down => Some(0.5),
            OctaveMode::Off => None,
            OctaveMode::Up => Some(2.0),
        }
    }
}

/// One of the four oscillator positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillatorSlot {
    pub enabled: bool,
    pub waveform: Waveform,
}

/// Full instrument state, read fresh on every trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentConfig {
    /// Master gain [0, 1].
    pub master_volume: f64,
    /// Seconds from trigger until every oscillator stops.
    pub sustain_seconds: f64,
    pub filter_mode: FilterMode,
    /// Frequency ratio for slot 2.
    pub detune_ratio: f64,
    pub octave_mode: OctaveMode,
    pub oscillators: [OscillatorSlot; SLOT_COUNT],
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        InstrumentConfig {
            master_volume: 0.5,
            sustain_seconds: 0.5,
            filter_mode: FilterMode::None,
            detune_ratio: 1.01,
            octave_mode: OctaveMode::Off,
            oscillators: [
                OscillatorSlot { enabled: true, waveform: Waveform::Sine },
                OscillatorSlot { enabled: true, waveform: Waveform::Sine },
                OscillatorSlot { enabled: false, waveform: Waveform::Square },
                OscillatorSlot { enabled: false, waveform: Waveform::Sawtooth },
            ],
        }
    }
}

/// Partial update sent by the UI. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub master_volume: Option<f64>,
    pub sustain_seconds: Option<f64>,
    pub filter_mode: Option<FilterMode>,
    pub detune_ratio: Option<f64>,
    pub octave_mode: Option<OctaveMode>,
    pub oscillators: [Option<SlotPatch>; SLOT_COUNT],
}

/// Partial update for one oscillator slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotPatch {
    pub enabled: Option<bool>,
    pub waveform: Option<Waveform>,
}

impl ConfigPatch {
    pub fn from_json(json: &str) -> Result<ConfigPatch, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::invalid_parameter("patch", e.to_string()))
    }

    fn validate(&self) -> Result<(), EngineError> {
        if let Some(v) = self.master_volume {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(EngineError::invalid_parameter(
                    "masterVolume",
                    format!("{v} is not within [0, 1]"),
                ));
            }
        }
        if let Some(s) = self.sustain_seconds {
            if !s.is_finite() || s <= 0.0 {
                return Err(EngineError::invalid_parameter(
                    "sustainSeconds",
                    format!("{s} is not a positive duration"),
                ));
            }
        }
        if let Some(d) = self.detune_ratio {
            if !d.is_finite() || d <= 0.0 {
                return Err(EngineError::invalid_parameter(
                    "detuneRatio",
                    format!("{d} is not a positive ratio"),
                ));
            }
        }
        Ok(())
    }
}

impl InstrumentConfig {
    /// Apply a partial update. An invalid patch changes nothing.
    pub fn apply(&mut self, patch: &ConfigPatch) -> Result<(), EngineError> {
        patch.validate()?;

        if let Some(v) = patch.master_volume {
            self.master_volume = v;
        }
        if let Some(s) = patch.sustain_seconds {
            self.sustain_seconds = s;
        }
        if let Some(f) = patch.filter_mode {
            self.filter_mode = f;
        }
        if let Some(d) = patch.detune_ratio {
            self.detune_ratio = d;
        }
        if let Some(o) = patch.octave_mode {
            self.octave_mode = o;
        }
        for (slot, slot_patch) in self.oscillators.iter_mut().zip(&patch.oscillators) {
            let Some(slot_patch) = slot_patch else {
                continue;
            };
            if let Some(enabled) = slot_patch.enabled {
                slot.enabled = enabled;
            }
            if let Some(waveform) = slot_patch.waveform {
                slot.waveform = waveform;
            }
        }
        Ok(())
    }

    /// Frequency ratio of slot `index` (0-based), or `None` past the last slot.
    pub fn slot_ratio(&self, index: usize) -> Option<f64> {
        match index {
            1 => Some(self.detune_ratio),
            _ => FIXED_SLOT_RATIOS.get(index).copied(),
        }
    }

    pub fn enabled_slots(&self) -> usize {
        self.oscillators.iter().filter(|s| s.enabled).count()
    }

    pub fn cycle_filter(&mut self) {
        self.filter_mode = self.filter_mode.next();
    }

    pub fn cycle_octave(&mut self) {
        self.octave_mode = self.octave_mode.next();
    }

    pub fn cycle_detune(&mut self) {
        self.detune_ratio = next_step(&DETUNE_STEPS, self.detune_ratio);
    }

    pub fn cycle_volume(&mut self) {
        self.master_volume = next_step(&VOLUME_STEPS, self.master_volume);
    }

    pub fn cycle_sustain(&mut self) {
        self.sustain_seconds = next_step(&SUSTAIN_STEPS, self.sustain_seconds);
    }

    /// Advance the waveform dial of slot `index` (0-based).
    pub fn cycle_waveform(&mut self, index: usize) -> Result<(), EngineError> {
        let slot = self.slot_mut(index)?;
        slot.waveform = slot.waveform.next();
        Ok(())
    }

    pub fn toggle_oscillator(&mut self, index: usize) -> Result<(), EngineError> {
        let slot = self.slot_mut(index)?;
        slot.enabled = !slot.enabled;
        Ok(())
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut OscillatorSlot, EngineError> {
        self.oscillators.get_mut(index).ok_or_else(|| {
            EngineError::invalid_parameter("slot", format!("no oscillator slot {index}"))
        })
    }
}

/// Next value in a dial's list, wrapping. A value that is not on the dial
/// (set through a patch) moves to the first position.
pub fn next_step<T: Copy + PartialEq>(steps: &[T], current: T) -> T {
    match steps.iter().position(|&s| s == current) {
        Some(idx) => steps[(idx + 1) % steps.len()],
        None => steps[0],
    }
}
