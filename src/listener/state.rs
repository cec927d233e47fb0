//! Listener phase state machine
//!
//! Pure transition logic, no I/O. The runner owns the side effects and
//! feeds events in; every cycle, successful or not, flows back through
//! `CoolingDown` to `Idle`, which is what keeps the assistant available
//! after any single failure.

/// Where the listener is in the command cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the wake word
    Idle,
    /// Capturing the utterance
    Recording,
    /// Running speech recognition
    Transcribing,
    /// Matching the transcript against the vocabulary
    Resolving,
    /// Executing the resolved command
    Dispatching,
    /// Brief pause before re-arming wake detection
    CoolingDown,
    /// Terminal: a stop was requested
    ShuttingDown,
}

/// Everything that can happen to the listener
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    WakeWordDetected,
    UtteranceCaptured,
    CaptureFailed { reason: String },
    Transcribed { text: String },
    TranscriptionFailed { reason: String },
    Resolved { command: String },
    ResolutionFailed { reason: String },
    Dispatched { success: bool },
    CooldownElapsed,
    /// External or spoken stop request; honoured from any phase
    StopRequested,
}

/// A transition that actually happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

/// Next phase for an event in a phase, or None if the event is not valid
/// there. Pure so every edge is testable in isolation.
pub fn next_phase(phase: Phase, event: &Event) -> Option<Phase> {
    use Event::*;
    use Phase::*;

    // A stop request wins over everything except an already-stopping
    // listener
    if matches!(event, StopRequested) {
        return match phase {
            ShuttingDown => None,
            _ => Some(ShuttingDown),
        };
    }

    match (phase, event) {
        (Idle, WakeWordDetected) => Some(Recording),

        (Recording, UtteranceCaptured) => Some(Transcribing),
        (Recording, CaptureFailed { .. }) => Some(CoolingDown),

        (Transcribing, Transcribed { .. }) => Some(Resolving),
        (Transcribing, TranscriptionFailed { .. }) => Some(CoolingDown),

        (Resolving, Resolved { .. }) => Some(Dispatching),
        (Resolving, ResolutionFailed { .. }) => Some(CoolingDown),

        (Dispatching, Dispatched { .. }) => Some(CoolingDown),

        (CoolingDown, CooldownElapsed) => Some(Idle),

        _ => None,
    }
}

/// Phase holder for the runner
#[derive(Debug)]
pub struct StateMachine {
    phase: Phase,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply an event. Invalid events are logged and ignored, never fatal.
    pub fn apply(&mut self, event: Event) -> Option<Transition> {
        match next_phase(self.phase, &event) {
            Some(to) => {
                let transition = Transition {
                    from: self.phase,
                    to,
                };
                tracing::debug!("{:?} -> {:?} on {:?}", transition.from, to, event);
                self.phase = to;
                Some(transition)
            }
            None => {
                tracing::warn!("Ignoring {:?} in phase {:?}", event, self.phase);
                None
            }
        }
    }
}
