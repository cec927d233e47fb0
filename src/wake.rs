//! Wake word detection
//!
//! Wraps rustpotter behind a frame-at-a-time interface. The listener feeds
//! it fixed-size frames while idle; a detection above the configured score
//! threshold arms the capture pipeline.

use crate::audio::SAMPLE_RATE;
use anyhow::{Context, Result};
use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};
use std::path::Path;

/// Wake word detector over the 16kHz mono pipeline stream
pub struct WakeWordDetector {
    detector: Rustpotter,
}

impl std::fmt::Debug for WakeWordDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeWordDetector").finish_non_exhaustive()
    }
}

impl WakeWordDetector {
    /// Load the wake word model at `model_path`. A missing or unreadable
    /// model is a startup failure, not a runtime one.
    pub fn new(model_path: &Path, threshold: f32) -> Result<Self> {
        let mut config = RustpotterConfig::default();
        config.fmt.sample_rate = SAMPLE_RATE as usize;
        config.fmt.channels = 1;
        config.fmt.sample_format = SampleFormat::F32;
        config.detector.threshold = threshold;

        let mut detector = Rustpotter::new(&config)
            .map_err(anyhow::Error::msg)
            .context("Failed to create wake word detector")?;
        detector
            .add_wakeword_from_file("hark", &model_path.to_string_lossy())
            .map_err(anyhow::Error::msg)
            .with_context(|| {
                format!("Failed to load wake word model from {}", model_path.display())
            })?;

        tracing::info!(
            "Wake word detector ready: model={}, threshold={}",
            model_path.display(),
            threshold
        );
        Ok(Self { detector })
    }

    /// Frame length the detector expects, in samples
    pub fn samples_per_frame(&self) -> usize {
        self.detector.get_samples_per_frame()
    }

    /// Feed one frame; returns true when the wake word was spotted
    pub fn process(&mut self, samples: &[f32]) -> bool {
        match self.detector.process_samples(samples.to_vec()) {
            Some(detection) => {
                tracing::info!(
                    "Wake word detected: '{}' (score {:.3})",
                    detection.name,
                    detection.score
                );
                true
            }
            None => false,
        }
    }
}
