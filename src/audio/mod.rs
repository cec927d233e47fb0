//! Audio subsystem for Hark
//!
//! Handles microphone capture, buffer management, and sample format
//! conversion. Everything downstream of this module works on 16kHz mono
//! f32 frames.

pub mod capture;
pub mod ring_buffer;

pub use capture::{samples_to_i16, AudioInput, CaptureError};
pub use ring_buffer::AudioRingBuffer;

/// Pipeline sample rate in Hz. Both recognisers expect 16kHz mono.
pub const SAMPLE_RATE: u32 = 16_000;

/// Frame length handed to the endpointer, in milliseconds
pub const FRAME_MS: u32 = 30;

/// Samples per endpointer frame at the pipeline rate
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize / 1000) * FRAME_MS as usize;
