//! Bounded utterance capture
//!
//! After the wake word fires, capture runs until the speaker pauses or the
//! hard time cap is reached, whichever comes first. Endpointing uses
//! webrtc-vad on 30ms frames; the rolling silence counter only ends capture
//! after speech has actually been heard, so a slow start is not cut short.

use crate::audio::{samples_to_i16, AudioInput, CaptureError, FRAME_MS, FRAME_SAMPLES, SAMPLE_RATE};
use crate::config::CaptureConfig;
use anyhow::{anyhow, Result};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// A captured utterance at the pipeline rate
pub struct Utterance {
    samples: Vec<f32>,
    /// Whether any speech frame was seen during capture
    had_speech: bool,
}

impl Utterance {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn had_speech(&self) -> bool {
        self.had_speech
    }

    pub fn duration_ms(&self) -> u32 {
        (self.samples.len() as u64 * 1000 / SAMPLE_RATE as u64) as u32
    }
}

/// Frame-level endpoint decision, separated from the VAD engine so the
/// stopping rules are testable on their own
struct Endpointer {
    silence_frames: u32,
    max_silence_frames: u32,
    had_speech: bool,
}

impl Endpointer {
    fn new(trailing_silence_ms: u32) -> Self {
        Self {
            silence_frames: 0,
            max_silence_frames: (trailing_silence_ms / FRAME_MS).max(1),
            had_speech: false,
        }
    }

    /// Feed one frame's speech/silence verdict; returns true when the
    /// utterance should end
    fn update(&mut self, is_speech: bool) -> bool {
        if is_speech {
            self.had_speech = true;
            self.silence_frames = 0;
            return false;
        }

        if !self.had_speech {
            // Leading silence never ends capture; the time cap does
            return false;
        }

        self.silence_frames += 1;
        self.silence_frames >= self.max_silence_frames
    }
}

/// Source of fixed-size pipeline frames; the microphone in production
pub trait FrameSource {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError>;
}

impl FrameSource for AudioInput {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError> {
        AudioInput::read_frame(self, frame)
    }
}

/// Captures one utterance per wake word detection
pub struct UtteranceRecorder {
    config: CaptureConfig,
}

impl UtteranceRecorder {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Record from `input` until the speaker pauses or the hard cap hits.
    ///
    /// Always returns a non-empty utterance on success; failures come only
    /// from the audio stream itself.
    pub fn record(&self, input: &mut impl FrameSource) -> Result<Utterance, CaptureError> {
        let mut vad = new_vad(self.config.vad_aggressiveness);
        let mut endpointer = Endpointer::new(self.config.trailing_silence_ms);

        let max_frames = (self.config.max_utterance_ms / FRAME_MS).max(1);
        let mut samples = Vec::with_capacity(max_frames as usize * FRAME_SAMPLES);
        let mut frame = [0.0f32; FRAME_SAMPLES];

        for _ in 0..max_frames {
            input.read_frame(&mut frame)?;
            samples.extend_from_slice(&frame);

            // A VAD engine error on one frame is treated as silence rather
            // than aborting the whole capture
            let is_speech = vad
                .is_voice_segment(&samples_to_i16(&frame))
                .unwrap_or(false);

            if endpointer.update(is_speech) {
                break;
            }
        }

        let utterance = Utterance {
            samples,
            had_speech: endpointer.had_speech,
        };
        tracing::debug!(
            "Captured utterance: {}ms, speech={}",
            utterance.duration_ms(),
            utterance.had_speech()
        );
        Ok(utterance)
    }
}

fn new_vad(aggressiveness: u8) -> Vad {
    let mode = match aggressiveness {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        _ => VadMode::VeryAggressive,
    };
    Vad::new_with_rate_and_mode(SampleRate::Rate16kHz, mode)
}

/// Validate capture settings at startup
pub fn validate_capture_config(config: &CaptureConfig) -> Result<()> {
    if config.max_utterance_ms < FRAME_MS {
        return Err(anyhow!(
            "max_utterance_ms must be at least one frame ({}ms)",
            FRAME_MS
        ));
    }
    if config.vad_aggressiveness > 3 {
        return Err(anyhow!("vad_aggressiveness must be 0-3"));
    }
    Ok(())
}
