//! Grammar-constrained offline transcription
//!
//! The acoustic model loads once at startup (it is the expensive part);
//! a fresh recogniser is built per utterance from the current vocabulary's
//! word list, so overrides added between commands take effect immediately.

use crate::audio::{samples_to_i16, SAMPLE_RATE};
use crate::recorder::Utterance;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use vosk::{Model, Recognizer};

/// Samples fed to the recogniser per call
const DECODE_CHUNK: usize = 4000;

/// Offline speech recogniser constrained to a known word list
pub struct ConstrainedTranscriber {
    model: Model,
}

impl std::fmt::Debug for ConstrainedTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstrainedTranscriber").finish_non_exhaustive()
    }
}

impl ConstrainedTranscriber {
    /// Load the acoustic model from `model_dir`. A missing model is a
    /// startup failure.
    pub fn new(model_dir: &Path) -> Result<Self> {
        vosk::set_log_level(vosk::LogLevel::Error);

        let model = Model::new(model_dir.to_string_lossy()).ok_or_else(|| {
            anyhow!(
                "Failed to load speech model from {} (is the model downloaded?)",
                model_dir.display()
            )
        })?;

        tracing::info!("Speech model loaded from {}", model_dir.display());
        Ok(Self { model })
    }

    /// Transcribe one utterance against the given word list
    ///
    /// Returns the lowercase transcript, which is empty when nothing in
    /// the grammar was recognised. An empty transcript is an ordinary
    /// outcome, not an error.
    pub fn transcribe(&self, utterance: &Utterance, grammar: &[String]) -> Result<String> {
        let mut recognizer =
            Recognizer::new_with_grammar(&self.model, SAMPLE_RATE as f32, grammar)
                .ok_or_else(|| anyhow!("Failed to create recogniser"))?;

        let samples = samples_to_i16(utterance.samples());
        for chunk in samples.chunks(DECODE_CHUNK) {
            recognizer
                .accept_waveform(chunk)
                .context("Recogniser rejected audio")?;
        }

        let text = recognizer
            .final_result()
            .single()
            .map(|r| r.text.trim().to_string())
            .unwrap_or_default();

        tracing::debug!(
            "Transcribed {}ms of audio: '{}'",
            utterance.duration_ms(),
            text
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_an_error() {
        let result = ConstrainedTranscriber::new(Path::new("/nonexistent/model"));
        assert!(result.is_err());
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("speech model"));
    }
}
