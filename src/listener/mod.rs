//! The always-on listener
//!
//! Ties the pipeline together: wake word detection while idle, then one
//! bounded capture-transcribe-resolve-dispatch cycle per detection. The
//! phase logic lives in [`state`], the side effects in [`runner`].

mod runner;
mod state;

pub use runner::Listener;
pub use state::{next_phase, Event, Phase, StateMachine, Transition};
