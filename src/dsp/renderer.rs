//! Offline renderer: bounces the current pattern to samples or WAV bytes.

use std::io::Cursor;

use crate::config::InstrumentConfig;
use crate::error::EngineError;
use crate::sequencer::{step_duration_ms, StepSequencer};

use super::context::AudioContext;
use super::voice::VoiceBuilder;

/// Render the active steps `loops` times, starting on step 0, followed by
/// enough tail for the last voice to finish. Returns mono samples.
pub fn render_pattern(
    config: &InstrumentConfig,
    sequencer: &StepSequencer,
    sample_rate: u32,
    loops: usize,
) -> Result<Vec<f32>, EngineError> {
    if loops == 0 {
        return Ok(Vec::new());
    }

    let sr = sample_rate as f64;
    let mut ctx = AudioContext::new(sr)?;
    ctx.resume()?;

    let steps = sequencer.active_steps();
    let step_seconds = step_duration_ms(sequencer.tempo_bpm()) / 1000.0;
    let total_steps = steps.len() * loops;
    let total_seconds = total_steps as f64 * step_seconds + config.sustain_seconds;
    let mut output = vec![0.0_f32; (total_seconds * sr).ceil() as usize];

    let builder = VoiceBuilder::new(config);
    let mut rendered = 0;
    for k in 0..total_steps {
        let step_frame = ((k as f64 * step_seconds * sr).round() as usize).min(output.len());
        ctx.render(&mut output[rendered..step_frame]);
        rendered = step_frame;
        if let Some(note) = steps[k % steps.len()] {
            builder.trigger_note(&mut ctx, note)?;
        }
    }
    ctx.render(&mut output[rendered..]);

    Ok(output)
}

/// Render the pattern and encode it as a 16-bit mono WAV file.
pub fn render_pattern_wav(
    config: &InstrumentConfig,
    sequencer: &StepSequencer,
    sample_rate: u32,
    loops: usize,
) -> Result<Vec<u8>, EngineError> {
    let samples = render_pattern(config, sequencer, sample_rate, loops)?;
    encode_wav(&samples, sample_rate)
}

fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, EngineError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    let encode = |e: hound::Error| EngineError::Encode(e.to_string());
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).map_err(encode)?;
    for &s in samples {
        let sample = (s as f64 * 32767.0).round().clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(sample).map_err(encode)?;
    }
    writer.finalize().map_err(encode)?;

    tracing::debug!(frames = samples.len(), bytes = bytes.len(), "pattern bounced");
    Ok(bytes)
}
