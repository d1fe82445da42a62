//! Step sequencer: a 24-step pattern of optional notes, played back one
//! sixteenth note per step.

use serde::{Deserialize, Serialize};

use crate::clock::Ticker;
use crate::config::{next_step, TEMPO_STEPS};
use crate::error::EngineError;
use crate::notes::Note;

/// Fixed number of steps a pattern stores.
pub const PATTERN_CAPACITY: usize = 24;

/// Pattern lengths selectable with [`StepSequencer::cycle_length`].
pub const LENGTH_STEPS: [usize; 5] = [4, 8, 12, 16, 24];

pub const DEFAULT_LENGTH: usize = 8;
pub const DEFAULT_TEMPO_BPM: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stopped,
    Playing,
}

/// Milliseconds per step (one sixteenth note) at `tempo_bpm`.
pub fn step_duration_ms(tempo_bpm: u32) -> f64 {
    (60.0 / tempo_bpm as f64 / 4.0) * 1000.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepSequencer {
    steps: [Option<Note>; PATTERN_CAPACITY],
    active_length: usize,
    selected_step: Option<usize>,
    position: usize,
    tempo_bpm: u32,
    transport: Transport,
    ticker: Ticker,
}

impl Default for StepSequencer {
    fn default() -> Self {
        StepSequencer::new()
    }
}

impl StepSequencer {
    pub fn new() -> Self {
        StepSequencer {
            steps: [None; PATTERN_CAPACITY],
            active_length: DEFAULT_LENGTH,
            selected_step: None,
            position: 0,
            tempo_bpm: DEFAULT_TEMPO_BPM,
            transport: Transport::Stopped,
            ticker: Ticker::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────

    /// All 24 stored steps, including those beyond the active length.
    pub fn steps(&self) -> &[Option<Note>; PATTERN_CAPACITY] {
        &self.steps
    }

    /// The steps playback actually reaches.
    pub fn active_steps(&self) -> &[Option<Note>] {
        &self.steps[..self.active_length]
    }

    pub fn step(&self, index: usize) -> Option<Note> {
        self.steps.get(index).copied().flatten()
    }

    pub fn active_length(&self) -> usize {
        self.active_length
    }

    /// Editing cursor; `None` means free-play mode.
    pub fn selected_step(&self) -> Option<usize> {
        self.selected_step
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    // ── Transport ───────────────────────────────────────────

    /// Any positive tempo is accepted. While playing, the new tempo takes
    /// effect on the next `start`.
    pub fn set_tempo(&mut self, bpm: u32) -> Result<(), EngineError> {
        if bpm == 0 {
            return Err(EngineError::InvalidTempo(bpm));
        }
        self.tempo_bpm = bpm;
        Ok(())
    }

    /// Advance the tempo dial: 80, 100, 120, 140, 160.
    pub fn cycle_tempo(&mut self) {
        self.tempo_bpm = next_step(&TEMPO_STEPS, self.tempo_bpm);
    }

    /// Toggle between stopped and playing. Starting arms the step timer
    /// at the current tempo; stopping freezes the position where it is.
    pub fn start(&mut self, now_ms: f64) -> Transport {
        match self.transport {
            Transport::Playing => {
                self.stop();
            }
            Transport::Stopped => {
                let period = step_duration_ms(self.tempo_bpm);
                self.ticker.start(now_ms, period);
                self.transport = Transport::Playing;
                tracing::info!(tempo = self.tempo_bpm, step_ms = period, "sequencer started");
            }
        }
        self.transport
    }

    /// Stop playback. Returns whether it was playing.
    pub fn stop(&mut self) -> bool {
        if self.transport == Transport::Stopped {
            return false;
        }
        self.ticker.stop();
        self.transport = Transport::Stopped;
        tracing::info!(position = self.position, "sequencer stopped");
        true
    }

    /// Run every tick due at `now_ms`, calling `play` for each step that
    /// holds a note. Returns the number of ticks run.
    pub fn poll(&mut self, now_ms: f64, mut play: impl FnMut(Note)) -> u32 {
        if !self.is_playing() {
            return 0;
        }
        let due = self.ticker.poll(now_ms);
        for _ in 0..due {
            self.tick(&mut play);
        }
        due
    }

    /// Advance one step, then play whatever the new step holds.
    pub fn tick(&mut self, mut play: impl FnMut(Note)) {
        self.position = (self.position + 1) % self.active_length;
        if let Some(note) = self.steps[self.position] {
            play(note);
        }
    }

    // ── Pattern editing ─────────────────────────────────────

    /// Clicking a step: deselects it if already selected, otherwise selects
    /// it and flips it between empty and the default note.
    pub fn toggle_step(&mut self, index: usize) -> Result<(), EngineError> {
        self.check_active(index)?;

        if self.selected_step == Some(index) {
            self.selected_step = None;
            return Ok(());
        }

        self.selected_step = Some(index);
        let step = &mut self.steps[index];
        *step = if step.is_some() {
            None
        } else {
            Some(Note::default_step())
        };
        Ok(())
    }

    /// Overwrite a stored step. Any of the 24 stored steps may be written.
    pub fn set_step_note(&mut self, index: usize, note: Option<Note>) -> Result<(), EngineError> {
        let step = self
            .steps
            .get_mut(index)
            .ok_or(EngineError::InvalidStepIndex {
                index,
                limit: PATTERN_CAPACITY,
            })?;
        *step = note;
        Ok(())
    }

    /// Keyboard input while programming: writes `note` into the selected
    /// step and moves the cursor on. Returns the step written, if any.
    /// Auditioning the note is left to the caller.
    pub fn handle_note_input(&mut self, note: Note) -> Option<usize> {
        let selected = self.selected_step?;
        self.steps[selected] = Some(note);
        self.selected_step = Some((selected + 1) % self.active_length);
        Some(selected)
    }

    /// Empty every step and rewind. Playback keeps running.
    pub fn clear(&mut self) {
        self.steps = [None; PATTERN_CAPACITY];
        self.position = 0;
        self.selected_step = None;
    }

    /// Advance through 4, 8, 12, 16, 24 steps and rewind. Steps beyond the
    /// new length keep their notes.
    pub fn cycle_length(&mut self) -> usize {
        self.active_length = next_step(&LENGTH_STEPS, self.active_length);
        self.position = 0;
        self.active_length
    }

    pub fn deselect(&mut self) {
        self.selected_step = None;
    }

    fn check_active(&self, index: usize) -> Result<(), EngineError> {
        if index >= self.active_length {
            return Err(EngineError::InvalidStepIndex {
                index,
                limit: self.active_length,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn note(name: &str) -> Note {
        Note::parse(name).unwrap()
    }

    #[test]
    fn defaults() {
        let s = StepSequencer::new();
        assert_eq!(s.active_length(), 8);
        assert_eq!(s.tempo_bpm(), 120);
        assert_eq!(s.position(), 0);
        assert_eq!(s.selected_step(), None);
        assert_eq!(s.transport(), Transport::Stopped);
        assert!(s.steps().iter().all(Option::is_none));
    }

    #[test]
    fn step_duration_is_a_sixteenth() {
        assert_eq!(step_duration_ms(120), 125.0);
        assert_eq!(step_duration_ms(60), 250.0);
        assert!((step_duration_ms(140) - 107.142857).abs() < 1e-5);
    }

    #[test]
    fn four_step_pattern_plays_in_advance_then_read_order() {
        let mut s = StepSequencer::new();
        s.cycle_length(); // 8 -> 12
        while s.active_length() != 4 {
            s.cycle_length();
        }
        s.set_step_note(0, Some(note("C"))).unwrap();
        s.set_step_note(2, Some(note("E"))).unwrap();

        s.start(0.0);
        let mut heard: Vec<(f64, usize, &str)> = Vec::new();
        for t in [125.0, 250.0, 375.0, 500.0] {
            let mut played = None;
            assert_eq!(s.poll(t, |n| played = Some(n.name())), 1);
            if let Some(name) = played {
                heard.push((t, s.position(), name));
            }
        }
        // Ticks land on steps 1, 2, 3, 0.
        assert_eq!(heard, vec![(250.0, 2, "E"), (500.0, 0, "C")]);
    }

    #[test]
    fn start_toggles_and_freezes_position() {
        let mut s = StepSequencer::new();
        assert_eq!(s.start(0.0), Transport::Playing);
        s.poll(375.0, |_| {});
        assert_eq!(s.position(), 3);
        assert_eq!(s.start(400.0), Transport::Stopped);
        assert_eq!(s.poll(10_000.0, |_| {}), 0);
        assert_eq!(s.position(), 3, "stop must not rewind");
        assert!(!s.stop(), "already stopped");
    }

    #[test]
    fn tempo_change_waits_for_next_start() {
        let mut s = StepSequencer::new();
        s.start(0.0);
        s.set_tempo(60).unwrap();
        assert_eq!(s.poll(125.0, |_| {}), 1, "still on the 120 bpm timer");
        s.start(125.0);
        s.start(125.0);
        assert_eq!(s.poll(250.0, |_| {}), 0);
        assert_eq!(s.poll(375.0, |_| {}), 1, "now on the 60 bpm timer");
    }

    #[test]
    fn zero_tempo_rejected() {
        let mut s = StepSequencer::new();
        assert_eq!(s.set_tempo(0), Err(EngineError::InvalidTempo(0)));
        assert_eq!(s.tempo_bpm(), 120);
        s.set_tempo(97).unwrap();
        assert_eq!(s.tempo_bpm(), 97);
        s.cycle_tempo();
        assert_eq!(s.tempo_bpm(), 80);
        s.cycle_tempo();
        assert_eq!(s.tempo_bpm(), 100);
    }

    #[test]
    fn toggle_selects_and_flips() {
        let mut s = StepSequencer::new();
        s.toggle_step(3).unwrap();
        assert_eq!(s.selected_step(), Some(3));
        assert_eq!(s.step(3), Some(Note::default_step()));

        // Second click on the same step only deselects.
        s.toggle_step(3).unwrap();
        assert_eq!(s.selected_step(), None);
        assert_eq!(s.step(3), Some(Note::default_step()));

        // Clicking a filled, unselected step clears it.
        s.toggle_step(3).unwrap();
        assert_eq!(s.step(3), None);
        assert_eq!(s.selected_step(), Some(3));
    }

    #[test]
    fn toggle_beyond_active_length_is_inert() {
        let mut s = StepSequencer::new();
        let err = s.toggle_step(8).unwrap_err();
        assert_eq!(err, EngineError::InvalidStepIndex { index: 8, limit: 8 });
        assert_eq!(s.step(8), None);
        assert_eq!(s.selected_step(), None);
    }

    #[test]
    fn set_step_note_bounds() {
        let mut s = StepSequencer::new();
        s.set_step_note(20, Some(note("A"))).unwrap();
        assert_eq!(s.step(20), Some(note("A")));
        assert!(s.set_step_note(24, Some(note("A"))).is_err());
        s.set_step_note(20, None).unwrap();
        assert_eq!(s.step(20), None);
    }

    #[test]
    fn note_input_writes_and_advances() {
        let mut s = StepSequencer::new();
        s.toggle_step(2).unwrap();
        assert_eq!(s.handle_note_input(note("G")), Some(2));
        assert_eq!(s.step(2), Some(note("G")));
        assert_eq!(s.selected_step(), Some(3));

        s.toggle_step(7).unwrap();
        s.handle_note_input(note("B"));
        assert_eq!(s.selected_step(), Some(0), "cursor wraps at active length");

        s.deselect();
        assert_eq!(s.handle_note_input(note("A")), None);
        assert_eq!(s.step(0), None);
    }

    #[test]
    fn clear_rewinds_but_keeps_playing() {
        let mut s = StepSequencer::new();
        s.toggle_step(1).unwrap();
        s.start(0.0);
        s.poll(250.0, |_| {});
        s.clear();
        assert!(s.steps().iter().all(Option::is_none));
        assert_eq!(s.position(), 0);
        assert_eq!(s.selected_step(), None);
        assert!(s.is_playing());
    }

    #[test]
    fn shorter_length_keeps_hidden_steps() {
        let mut s = StepSequencer::new();
        s.set_step_note(6, Some(note("D"))).unwrap();
        while s.active_length() != 4 {
            s.cycle_length();
        }
        assert_eq!(s.active_steps().len(), 4);
        assert_eq!(s.step(6), Some(note("D")));
        assert!(s.toggle_step(6).is_err());

        let mut played = Vec::new();
        for _ in 0..8 {
            s.tick(|n| played.push(n));
        }
        assert!(played.is_empty(), "step 6 is out of reach");

        while s.active_length() != 8 {
            s.cycle_length();
        }
        assert_eq!(s.step(6), Some(note("D")));
    }

    #[test]
    fn length_cycle_order() {
        let mut s = StepSequencer::new();
        let seen: Vec<usize> = (0..6).map(|_| s.cycle_length()).collect();
        assert_eq!(seen, vec![12, 16, 24, 4, 8, 12]);
    }

    proptest! {
        #[test]
        fn toggle_pair_deselects_and_keeps_note(len_cycles in 0usize..5, raw in 0usize..24) {
            let mut s = StepSequencer::new();
            for _ in 0..len_cycles {
                s.cycle_length();
            }
            let index = raw % s.active_length();
            s.toggle_step(index).unwrap();
            s.toggle_step(index).unwrap();
            // Second toggle deselects without touching the note.
            prop_assert_eq!(s.step(index), Some(Note::default_step()));
            prop_assert_eq!(s.selected_step(), None);
            // A third toggle reselects and clears it again.
            s.toggle_step(index).unwrap();
            prop_assert_eq!(s.step(index), None);
        }

        #[test]
        fn cycle_length_always_rewinds(ticks in 0usize..100, cycles in 1usize..12) {
            let mut s = StepSequencer::new();
            for _ in 0..ticks {
                s.tick(|_| {});
            }
            for _ in 0..cycles {
                let before = s.active_length();
                let after = s.cycle_length();
                let idx = LENGTH_STEPS.iter().position(|&l| l == before).unwrap();
                prop_assert_eq!(after, LENGTH_STEPS[(idx + 1) % LENGTH_STEPS.len()]);
                prop_assert_eq!(s.position(), 0);
            }
        }

        #[test]
        fn position_stays_within_active_length(ticks in 0usize..200, cycles in 0usize..5) {
            let mut s = StepSequencer::new();
            for _ in 0..cycles {
                s.cycle_length();
            }
            for _ in 0..ticks {
                s.tick(|_| {});
                prop_assert!(s.position() < s.active_length());
            }
        }
    }
}
