//! Mixer: sums every live voice into the output block.

use super::voice::Voice;

/// A summing mixer over the voices currently sounding.
///
/// Voices are dropped on the block in which their stop frame passes, which
/// is what releases their oscillators and filters.
pub struct Mixer {
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn new() -> Self {
        Mixer { voices: Vec::new() }
    }

    pub fn add(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    /// Render `out.len()` frames starting at absolute frame `start_frame`,
    /// soft clipping the sum. Each voice applies its own master volume.
    pub fn render(&mut self, out: &mut [f32], start_frame: u64) {
        for (i, sample) in out.iter_mut().enumerate() {
            let frame = start_frame + i as u64;
            let mut sum = 0.0;
            for voice in self.voices.iter_mut() {
                sum += voice.render_frame(frame);
            }
            *sample = soft_clip(sum) as f32;
        }

        let end_frame = start_frame + out.len() as u64;
        self.voices.retain(|v| !v.is_finished(end_frame));
    }

    /// Voices still held by the mixer.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Mixer::new()
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use crate::dsp::voice::VoiceBuilder;
    use crate::notes::Note;

    fn voice_at(start: f64, sustain: f64) -> Voice {
        let config = InstrumentConfig {
            sustain_seconds: sustain,
            ..InstrumentConfig::default()
        };
        let plan = VoiceBuilder::new(&config).build(Note::parse("A").unwrap(), start);
        Voice::new(&plan, 1000.0)
    }

    #[test]
    fn empty_mixer_renders_silence() {
        let mut m = Mixer::new();
        let mut out = [1.0_f32; 128];
        m.render(&mut out, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn drops_voices_after_stop_frame() {
        let mut m = Mixer::new();
        m.add(voice_at(0.0, 0.1)); // stops at frame 100
        m.add(voice_at(0.0, 0.3)); // stops at frame 300
        assert_eq!(m.len(), 2);

        let mut out = [0.0_f32; 64];
        m.render(&mut out, 0);
        assert_eq!(m.len(), 2);
        m.render(&mut out, 64);
        assert_eq!(m.len(), 1, "first voice ends inside the second block");
        m.render(&mut out, 256);
        assert!(m.is_empty());
    }

    #[test]
    fn output_is_clipped_sum_of_voices() {
        let mut m = Mixer::new();
        m.add(voice_at(0.0, 0.5));
        let mut reference = voice_at(0.0, 0.5);

        let mut out = [0.0_f32; 128];
        m.render(&mut out, 0);
        for (frame, &s) in out.iter().enumerate() {
            let expected = reference.render_frame(frame as u64).tanh() as f32;
            assert_eq!(s, expected, "frame {frame}");
        }
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let mut m = Mixer::new();
        for _ in 0..50 {
            m.add(voice_at(0.0, 1.0));
        }
        let mut out = [0.0_f32; 256];
        m.render(&mut out, 0);
        assert!(out.iter().all(|s| s.abs() <= 1.0), "soft clip should bound output");
    }
}
