//! WASM surface for the browser UI.
//!
//! The page owns an `AudioWorklet` that calls [`WebSynth::render`] for each
//! block, and a timer or animation frame that calls [`WebSynth::poll`] with
//! `performance.now()`. Everything else is a direct forward of a UI gesture.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::config::ConfigPatch;
use crate::dsp::renderer;
use crate::engine::{Engine, EngineEvent};

/// Events held for `drainEvents` before the oldest are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Engine events waiting for the page to collect them.
#[derive(Debug, Default)]
struct EventQueue {
    events: VecDeque<EngineEvent>,
    dropped: u64,
}

impl EventQueue {
    fn push(&mut self, event: EngineEvent) {
        if self.events.len() == EVENT_QUEUE_CAPACITY {
            self.events.pop_front();
            self.dropped += 1;
            if self.dropped == 1 {
                tracing::debug!(
                    capacity = EVENT_QUEUE_CAPACITY,
                    "event queue full, dropping oldest"
                );
            }
        }
        self.events.push_back(event);
    }

    fn drain(&mut self) -> Vec<EngineEvent> {
        self.dropped = 0;
        self.events.drain(..).collect()
    }
}

#[wasm_bindgen]
pub struct WebSynth {
    engine: Engine,
    sample_rate: u32,
    events: Rc<RefCell<EventQueue>>,
}

fn to_js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen]
impl WebSynth {
    /// Open the engine. Fails once, up front, if the output cannot start.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: u32) -> Result<WebSynth, JsValue> {
        let mut engine = Engine::new(sample_rate as f64).map_err(to_js_error)?;
        let events = Rc::new(RefCell::new(EventQueue::default()));
        let sink = Rc::clone(&events);
        engine.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        Ok(WebSynth {
            engine,
            sample_rate,
            events,
        })
    }

    /// Apply a partial `InstrumentConfig` object.
    #[wasm_bindgen(js_name = setInstrumentConfig)]
    pub fn set_instrument_config(&mut self, patch: JsValue) -> Result<(), JsValue> {
        let patch: ConfigPatch = serde_wasm_bindgen::from_value(patch).map_err(to_js_error)?;
        self.engine.set_instrument_config(&patch);
        Ok(())
    }

    #[wasm_bindgen(js_name = setStep)]
    pub fn set_step(&mut self, index: usize, note: Option<String>) {
        self.engine.set_pattern(index, note.as_deref());
    }

    #[wasm_bindgen(js_name = toggleStep)]
    pub fn toggle_step(&mut self, index: usize) {
        self.engine.toggle_step(index);
    }

    pub fn start(&mut self, now_ms: f64) {
        self.engine.start(now_ms);
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    #[wasm_bindgen(js_name = cycleLength)]
    pub fn cycle_length(&mut self) {
        self.engine.cycle_length();
    }

    pub fn clear(&mut self) {
        self.engine.clear();
    }

    pub fn deselect(&mut self) {
        self.engine.deselect();
    }

    #[wasm_bindgen(js_name = playNote)]
    pub fn play_note(&mut self, name: &str) {
        self.engine.play_note(name);
    }

    /// Piano key or computer keyboard press.
    #[wasm_bindgen(js_name = keyInput)]
    pub fn key_input(&mut self, name: &str) {
        self.engine.handle_note_input(name);
    }

    #[wasm_bindgen(js_name = cycleFilter)]
    pub fn cycle_filter(&mut self) {
        self.engine.cycle_filter();
    }

    #[wasm_bindgen(js_name = cycleDetune)]
    pub fn cycle_detune(&mut self) {
        self.engine.cycle_detune();
    }

    #[wasm_bindgen(js_name = cycleVolume)]
    pub fn cycle_volume(&mut self) {
        self.engine.cycle_volume();
    }

    #[wasm_bindgen(js_name = cycleSustain)]
    pub fn cycle_sustain(&mut self) {
        self.engine.cycle_sustain();
    }

    #[wasm_bindgen(js_name = cycleTempo)]
    pub fn cycle_tempo(&mut self) {
        self.engine.cycle_tempo();
    }

    #[wasm_bindgen(js_name = cycleOctave)]
    pub fn cycle_octave(&mut self) {
        self.engine.cycle_octave();
    }

    /// `slot` is 1-based, as printed on the panel.
    #[wasm_bindgen(js_name = cycleWaveform)]
    pub fn cycle_waveform(&mut self, slot: usize) {
        if let Some(idx) = slot.checked_sub(1) {
            self.engine.cycle_waveform(idx);
        }
    }

    /// `slot` is 1-based, as printed on the panel.
    #[wasm_bindgen(js_name = toggleOscillator)]
    pub fn toggle_oscillator(&mut self, slot: usize) {
        if let Some(idx) = slot.checked_sub(1) {
            self.engine.toggle_oscillator(idx);
        }
    }

    /// Advance the step timer to `now_ms`.
    pub fn poll(&mut self, now_ms: f64) -> u32 {
        self.engine.poll(now_ms)
    }

    /// Fill an AudioWorklet output block.
    pub fn render(&mut self, out: &mut [f32]) {
        self.engine.render(out);
    }

    /// Full display state as a plain object.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.snapshot()).map_err(to_js_error)
    }

    /// Events since the last call, oldest first. At most
    /// [`EVENT_QUEUE_CAPACITY`] are kept between calls.
    #[wasm_bindgen(js_name = drainEvents)]
    pub fn drain_events(&mut self) -> Result<JsValue, JsValue> {
        let events = self.events.borrow_mut().drain();
        serde_wasm_bindgen::to_value(&events).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = playbackPosition)]
    pub fn playback_position(&self) -> usize {
        self.engine.sequencer().position()
    }

    #[wasm_bindgen(js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.engine.sequencer().is_playing()
    }

    /// Selected step, or -1 in free-play mode.
    #[wasm_bindgen(js_name = selectedStep)]
    pub fn selected_step(&self) -> i32 {
        self.engine
            .sequencer()
            .selected_step()
            .map_or(-1, |s| s as i32)
    }

    /// Key to light up on the keyboard at `performance.now()`, if any.
    #[wasm_bindgen(js_name = pressedNote)]
    pub fn pressed_note(&self, now_ms: f64) -> Option<String> {
        self.engine.pressed_note(now_ms).map(|n| n.name().to_string())
    }

    /// Bounce the pattern to a WAV file.
    #[wasm_bindgen(js_name = renderPatternWav)]
    pub fn render_pattern_wav(&self, loops: usize) -> Result<Vec<u8>, JsValue> {
        renderer::render_pattern_wav(
            self.engine.config(),
            self.engine.sequencer(),
            self.sample_rate,
            loops,
        )
        .map_err(to_js_error)
    }

    pub fn close(&mut self) {
        self.engine.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_queue_keeps_newest_when_full() {
        let mut queue = EventQueue::default();
        for position in 0..EVENT_QUEUE_CAPACITY + 40 {
            queue.push(EngineEvent::PositionChanged { position });
        }
        assert_eq!(queue.events.len(), EVENT_QUEUE_CAPACITY);
        assert_eq!(queue.dropped, 40);

        let drained = queue.drain();
        assert_eq!(drained.len(), EVENT_QUEUE_CAPACITY);
        assert_eq!(drained[0], EngineEvent::PositionChanged { position: 40 });
        assert_eq!(
            drained.last(),
            Some(&EngineEvent::PositionChanged {
                position: EVENT_QUEUE_CAPACITY + 39
            })
        );
        assert!(queue.drain().is_empty());
        assert_eq!(queue.dropped, 0);
    }

    #[test]
    fn engine_events_stay_bounded_without_draining() {
        let mut engine = Engine::new(1000.0).unwrap();
        let events = Rc::new(RefCell::new(EventQueue::default()));
        let sink = Rc::clone(&events);
        engine.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        engine.start(0.0);
        for i in 1..=1000 {
            engine.poll(i as f64 * 125.0);
        }
        assert_eq!(events.borrow().events.len(), EVENT_QUEUE_CAPACITY);
    }
}
