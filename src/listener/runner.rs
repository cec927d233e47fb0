//! Listener runtime
//!
//! Owns the microphone, the recognisers and the vocabulary store, and runs
//! the command loop. Startup errors (no device, missing models) propagate
//! to the caller; once `run` is looping, per-cycle failures are folded into
//! the state machine and the listener keeps going.

use super::state::{Event, Phase, StateMachine};
use crate::audio::AudioInput;
use crate::config::{self, Config};
use crate::dispatch::{dispatch, Outcome};
use crate::notify::{notify, Urgency};
use crate::recorder::{validate_capture_config, UtteranceRecorder};
use crate::resolver::resolve;
use crate::transcribe::ConstrainedTranscriber;
use crate::vocabulary::{ActionKind, VocabularyStore};
use crate::wake::WakeWordDetector;
use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use std::time::Duration;

/// The assembled voice command pipeline
pub struct Listener {
    config: Config,
    input: AudioInput,
    wake: WakeWordDetector,
    recorder: UtteranceRecorder,
    transcriber: ConstrainedTranscriber,
    vocabulary: VocabularyStore,
    machine: StateMachine,
}

impl Listener {
    /// Open the microphone and load both models. Anything missing here is
    /// fatal; after this returns Ok the listener can survive on its own.
    pub fn new(config: Config) -> Result<Self> {
        validate_capture_config(&config.capture)?;

        let input = AudioInput::open(config.audio.device.as_deref())
            .context("Audio input unavailable")?;
        let wake = WakeWordDetector::new(
            &config.wake.resolved_model_path(),
            config.wake.threshold,
        )?;
        let transcriber =
            ConstrainedTranscriber::new(&config.transcription.resolved_model_dir())?;
        let vocabulary = VocabularyStore::new(config::get_overrides_path());
        let recorder = UtteranceRecorder::new(config.capture.clone());

        Ok(Self {
            config,
            input,
            wake,
            recorder,
            transcriber,
            vocabulary,
            machine: StateMachine::new(),
        })
    }

    /// Run until a stop is requested, by voice or through `shutdown`.
    ///
    /// Only the audio stream dying ends the loop with an error; every
    /// other failure notifies the user and returns to idle.
    pub fn run(&mut self, shutdown: Receiver<()>) -> Result<()> {
        let mut wake_frame = vec![0.0f32; self.wake.samples_per_frame()];

        self.notify(
            &format!("Listening for '{}'", self.config.resolver.assistant_name),
            "Say the wake word, then a command.",
            Urgency::Low,
        );

        loop {
            match self.machine.phase() {
                Phase::Idle => {
                    if shutdown.try_recv().is_ok() {
                        self.machine.apply(Event::StopRequested);
                        continue;
                    }

                    self.input
                        .read_frame(&mut wake_frame)
                        .context("Audio stream lost while idle")?;
                    if self.wake.process(&wake_frame) {
                        self.machine.apply(Event::WakeWordDetected);
                    }
                }
                Phase::Recording => self.run_cycle(),
                Phase::CoolingDown => {
                    std::thread::sleep(Duration::from_millis(
                        self.config.capture.rearm_cooldown_ms as u64,
                    ));
                    // Anything said or played during the cycle must not
                    // re-trigger the wake word
                    self.input.discard_pending();
                    self.machine.apply(Event::CooldownElapsed);
                }
                Phase::ShuttingDown => {
                    self.notify("Stopped listening", "Goodbye.", Urgency::Normal);
                    tracing::info!("Listener shut down");
                    return Ok(());
                }
                phase => {
                    // run_cycle drives the inner phases itself
                    tracing::warn!("Unexpected phase {:?} in main loop", phase);
                    self.machine.apply(Event::CooldownElapsed);
                }
            }
        }
    }

    /// One capture-transcribe-resolve-dispatch cycle, entered in
    /// `Recording` and left in `CoolingDown` or `ShuttingDown`
    fn run_cycle(&mut self) {
        self.notify("Yes?", "Listening for a command.", Urgency::Low);

        let utterance = match self.recorder.record(&mut self.input) {
            Ok(u) => {
                self.machine.apply(Event::UtteranceCaptured);
                u
            }
            Err(e) => {
                tracing::error!("Capture failed: {}", e);
                self.notify("Capture failed", &e.to_string(), Urgency::Critical);
                self.machine.apply(Event::CaptureFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        // One snapshot serves the whole cycle; an override edit landing
        // mid-cycle applies from the next wake word
        self.vocabulary.reload_if_changed();
        let vocab = self.vocabulary.snapshot();
        let grammar = vocab.grammar(&self.config.resolver);

        let transcript = match self.transcriber.transcribe(&utterance, &grammar) {
            Ok(text) if !text.is_empty() => {
                self.machine.apply(Event::Transcribed { text: text.clone() });
                text
            }
            Ok(_) => {
                self.notify("Didn't catch that", "Nothing was recognised.", Urgency::Low);
                self.machine.apply(Event::TranscriptionFailed {
                    reason: "empty transcript".to_string(),
                });
                return;
            }
            Err(e) => {
                tracing::error!("Transcription failed: {:#}", e);
                self.notify("Transcription failed", &format!("{:#}", e), Urgency::Normal);
                self.machine.apply(Event::TranscriptionFailed {
                    reason: format!("{:#}", e),
                });
                return;
            }
        };

        tracing::info!("Heard: '{}'", transcript);

        let command = match resolve(&vocab, &transcript, &self.config.resolver) {
            Ok(cmd) => {
                self.machine.apply(Event::Resolved {
                    command: cmd.name.clone(),
                });
                cmd
            }
            Err(no_match) => {
                tracing::info!("No command for '{}': {}", transcript, no_match);
                self.notify(
                    "No matching command",
                    &format!("Heard '{}' but {}.", transcript, no_match),
                    Urgency::Low,
                );
                self.machine.apply(Event::ResolutionFailed {
                    reason: no_match.to_string(),
                });
                return;
            }
        };

        let outcome = dispatch(&command, &vocab, &self.config.dispatch);
        match &outcome {
            Outcome::Success(message) => self.notify("Hark", message, Urgency::Normal),
            Outcome::Failure(message) => {
                self.notify("Command failed", message, Urgency::Critical)
            }
        }

        if command.action == ActionKind::StopListening {
            self.machine.apply(Event::StopRequested);
            return;
        }

        self.machine.apply(Event::Dispatched {
            success: matches!(outcome, Outcome::Success(_)),
        });
    }

    fn notify(&self, summary: &str, body: &str, urgency: Urgency) {
        if self.config.notifications.enabled {
            notify(summary, body, urgency);
        }
    }
}
