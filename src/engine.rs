//! Engine: the single owner of instrument state.
//!
//! The UI never holds synth state itself: it calls the mutation methods
//! here and listens for [`EngineEvent`]s to refresh its display. Musical
//! input errors (unknown notes, out-of-range steps, a closed output) are
//! logged and dropped so a live performance is never interrupted.

use serde::Serialize;

use crate::config::{ConfigPatch, InstrumentConfig};
use crate::dsp::context::{AudioContext, ContextState};
use crate::dsp::voice::VoiceBuilder;
use crate::error::EngineError;
use crate::notes::Note;
use crate::sequencer::{StepSequencer, Transport};

/// How long the UI should show a key as pressed after a trigger.
pub const NOTE_DISPLAY_MS: f64 = 200.0;

/// Change notifications for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A voice started. `time` is the audio context time in seconds.
    #[serde(rename_all = "camelCase")]
    NoteTriggered { note: Note, time: f64, display_ms: f64 },
    PositionChanged { position: usize },
    TransportChanged { playing: bool },
    SelectionChanged { selected: Option<usize> },
    StepChanged { index: usize, note: Option<Note> },
    PatternCleared,
    LengthChanged { length: usize },
    TempoChanged { bpm: u32 },
    ConfigChanged,
}

/// Handle returned by [`Engine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&EngineEvent)>;

/// Everything the UI needs to draw the instrument in one go.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub config: InstrumentConfig,
    pub steps: Vec<Option<Note>>,
    pub active_length: usize,
    pub position: usize,
    pub selected_step: Option<usize>,
    pub tempo_bpm: u32,
    pub transport: Transport,
    pub audio: ContextState,
}

pub struct Engine {
    config: InstrumentConfig,
    sequencer: StepSequencer,
    context: AudioContext,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    /// Latest host time seen by `start` or `poll`, in milliseconds.
    host_ms: f64,
    /// Last triggered note and the host time it was stamped with.
    last_trigger: Option<(Note, f64)>,
}

impl Engine {
    /// Create the engine with power-on defaults. Failing to open the audio
    /// output is the one error reported to the caller.
    pub fn new(sample_rate: f64) -> Result<Self, EngineError> {
        let context = AudioContext::new(sample_rate)?;
        Ok(Engine {
            config: InstrumentConfig::default(),
            sequencer: StepSequencer::new(),
            context,
            listeners: Vec::new(),
            next_listener: 0,
            host_ms: 0.0,
            last_trigger: None,
        })
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let seq = &self.sequencer;
        EngineSnapshot {
            config: self.config.clone(),
            steps: seq.steps().to_vec(),
            active_length: seq.active_length(),
            position: seq.position(),
            selected_step: seq.selected_step(),
            tempo_bpm: seq.tempo_bpm(),
            transport: seq.transport(),
            audio: self.context.state(),
        }
    }

    // ── Observers ───────────────────────────────────────────

    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: EngineEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    // ── Instrument configuration ────────────────────────────

    pub fn set_instrument_config(&mut self, patch: &ConfigPatch) {
        match self.config.apply(patch) {
            Ok(()) => self.emit(EngineEvent::ConfigChanged),
            Err(err) => tracing::warn!(%err, "config patch rejected"),
        }
    }

    /// Apply a slot knob and notify if it took.
    fn turn_slot_knob(
        &mut self,
        turn: impl FnOnce(&mut InstrumentConfig) -> Result<(), EngineError>,
    ) {
        match turn(&mut self.config) {
            Ok(()) => self.emit(EngineEvent::ConfigChanged),
            Err(err) => tracing::debug!(%err, "knob ignored"),
        }
    }

    pub fn cycle_filter(&mut self) {
        self.config.cycle_filter();
        self.emit(EngineEvent::ConfigChanged);
    }

    pub fn cycle_detune(&mut self) {
        self.config.cycle_detune();
        self.emit(EngineEvent::ConfigChanged);
    }

    pub fn cycle_volume(&mut self) {
        self.config.cycle_volume();
        self.emit(EngineEvent::ConfigChanged);
    }

    pub fn cycle_sustain(&mut self) {
        self.config.cycle_sustain();
        self.emit(EngineEvent::ConfigChanged);
    }

    pub fn cycle_octave(&mut self) {
        self.config.cycle_octave();
        self.emit(EngineEvent::ConfigChanged);
    }

    /// `slot` is 0-based.
    pub fn cycle_waveform(&mut self, slot: usize) {
        self.turn_slot_knob(|c| c.cycle_waveform(slot));
    }

    /// `slot` is 0-based.
    pub fn toggle_oscillator(&mut self, slot: usize) {
        self.turn_slot_knob(|c| c.toggle_oscillator(slot));
    }

    // ── Transport ───────────────────────────────────────────

    /// Toggle playback. `now_ms` is the host clock the engine is polled with.
    pub fn start(&mut self, now_ms: f64) {
        self.host_ms = self.host_ms.max(now_ms);
        let transport = self.sequencer.start(now_ms);
        self.emit(EngineEvent::TransportChanged {
            playing: transport == Transport::Playing,
        });
    }

    pub fn stop(&mut self) {
        if self.sequencer.stop() {
            self.emit(EngineEvent::TransportChanged { playing: false });
        }
    }

    pub fn set_tempo(&mut self, bpm: u32) {
        match self.sequencer.set_tempo(bpm) {
            Ok(()) => self.emit(EngineEvent::TempoChanged { bpm }),
            Err(err) => tracing::debug!(%err, "tempo ignored"),
        }
    }

    pub fn cycle_tempo(&mut self) {
        self.sequencer.cycle_tempo();
        let bpm = self.sequencer.tempo_bpm();
        self.emit(EngineEvent::TempoChanged { bpm });
    }

    /// Run the step timer up to `now_ms`, triggering every note it lands on.
    /// Returns the number of steps advanced.
    pub fn poll(&mut self, now_ms: f64) -> u32 {
        self.host_ms = self.host_ms.max(now_ms);
        let mut due = Vec::new();
        let ticks = self.sequencer.poll(now_ms, |note| due.push(note));
        if ticks == 0 {
            return 0;
        }
        let position = self.sequencer.position();
        self.emit(EngineEvent::PositionChanged { position });
        for note in due {
            self.trigger(note);
        }
        ticks
    }

    /// Pull a block of audio for the output device.
    pub fn render(&mut self, out: &mut [f32]) {
        self.context.render(out);
    }

    /// Tear down: stop the sequencer and close the output.
    pub fn close(&mut self) {
        self.stop();
        self.context.close();
    }

    // ── Pattern editing ─────────────────────────────────────

    /// Write a step. `None` or an empty name clears it.
    pub fn set_pattern(&mut self, index: usize, note: Option<&str>) {
        let note = match note.filter(|n| !n.is_empty()) {
            None => None,
            Some(name) => match Note::parse(name) {
                Some(n) => Some(n),
                None => {
                    tracing::debug!(note = name, index, "unknown note, step unchanged");
                    return;
                }
            },
        };
        match self.sequencer.set_step_note(index, note) {
            Ok(()) => self.emit(EngineEvent::StepChanged { index, note }),
            Err(err) => tracing::debug!(%err, "step write ignored"),
        }
    }

    pub fn toggle_step(&mut self, index: usize) {
        if let Err(err) = self.sequencer.toggle_step(index) {
            tracing::debug!(%err, "step toggle ignored");
            return;
        }
        let note = self.sequencer.step(index);
        let selected = self.sequencer.selected_step();
        self.emit(EngineEvent::StepChanged { index, note });
        self.emit(EngineEvent::SelectionChanged { selected });
    }

    pub fn clear(&mut self) {
        self.sequencer.clear();
        self.emit(EngineEvent::PatternCleared);
        self.emit(EngineEvent::PositionChanged { position: 0 });
        self.emit(EngineEvent::SelectionChanged { selected: None });
    }

    pub fn cycle_length(&mut self) {
        let length = self.sequencer.cycle_length();
        self.emit(EngineEvent::LengthChanged { length });
        self.emit(EngineEvent::PositionChanged { position: 0 });
    }

    pub fn deselect(&mut self) {
        self.sequencer.deselect();
        self.emit(EngineEvent::SelectionChanged { selected: None });
    }

    // ── Playing ─────────────────────────────────────────────

    /// Free play: sound the note without touching the pattern.
    pub fn play_note(&mut self, name: &str) {
        match Note::parse(name) {
            Some(note) => self.trigger(note),
            None => tracing::debug!(note = name, "unknown note ignored"),
        }
    }

    /// A key press from the keyboard: programs the selected step (if any),
    /// moves the cursor on, and always auditions the note.
    pub fn handle_note_input(&mut self, name: &str) {
        let Some(note) = Note::parse(name) else {
            tracing::debug!(note = name, "unknown note ignored");
            return;
        };
        if let Some(index) = self.sequencer.handle_note_input(note) {
            let selected = self.sequencer.selected_step();
            self.emit(EngineEvent::StepChanged {
                index,
                note: Some(note),
            });
            self.emit(EngineEvent::SelectionChanged { selected });
        }
        self.trigger(note);
    }

    /// The note to show as pressed at host time `now_ms`, while within its
    /// display window. Triggers are stamped with the latest host time passed
    /// to [`Engine::poll`] or [`Engine::start`].
    pub fn pressed_note(&self, now_ms: f64) -> Option<Note> {
        let (note, stamp_ms) = self.last_trigger?;
        let elapsed_ms = (now_ms - stamp_ms).max(0.0);
        (elapsed_ms < NOTE_DISPLAY_MS).then_some(note)
    }

    /// Start a voice with the configuration as it is right now.
    fn trigger(&mut self, note: Note) {
        match VoiceBuilder::new(&self.config).trigger_note(&mut self.context, note) {
            Ok(()) => {
                let time = self.context.current_time();
                self.last_trigger = Some((note, self.host_ms));
                self.emit(EngineEvent::NoteTriggered {
                    note,
                    time,
                    display_ms: NOTE_DISPLAY_MS,
                });
            }
            Err(err) => tracing::debug!(%err, note = note.name(), "trigger skipped"),
        }
    }
}
