//! Microphone capture using cpal with a lock-free ring buffer
//!
//! One input stream is opened at startup and stays open for the life of the
//! process. The cpal callback only writes raw samples into the ring buffer;
//! channel downmixing and resampling to the 16kHz mono pipeline rate happen
//! on the consumer side in `read_frame`.

use super::ring_buffer::AudioRingBuffer;
use super::SAMPLE_RATE;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Polling interval while waiting for the callback to produce samples
const READ_POLL: Duration = Duration::from_millis(10);

/// How long `read_frame` waits for audio before declaring the device dead.
/// A healthy device delivers samples every few milliseconds.
const STARVATION_TIMEOUT: Duration = Duration::from_secs(3);

/// Capture failures that can surface after the stream is up
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("audio stream reported an error")]
    StreamFailed,
    #[error("no audio arrived within {0:?}")]
    Starved(Duration),
}

/// An open microphone stream delivering 16kHz mono f32 frames
///
/// Not `Sync`: one owner reads frames, which is all the pipeline needs.
pub struct AudioInput {
    // Held so the stream keeps running; dropped with the struct
    _stream: cpal::Stream,
    ring: Arc<AudioRingBuffer>,
    failed: Arc<AtomicBool>,
    source_rate: u32,
    source_channels: usize,
    // Fractional position carried across chunks so decimation stays
    // continuous at chunk boundaries
    resample_acc: f64,
    pending: VecDeque<f32>,
    scratch: Vec<f32>,
}

impl AudioInput {
    /// Open the named input device, or the system default when `device`
    /// is None. Fails if no usable input device exists.
    #[allow(deprecated)] // cpal 0.17 deprecates name() but description() is not yet stable
    pub fn open(device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device {
            Some(wanted) => host
                .input_devices()
                .context("Failed to enumerate input devices")?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| anyhow!("Input device '{}' not found", wanted))?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("No default input device available"))?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let supported_config = device
            .default_input_config()
            .context("Failed to query input device config")?;
        let source_rate = supported_config.sample_rate();
        let source_channels = supported_config.channels() as usize;

        tracing::info!(
            "Opening input stream: device='{}', {}Hz, {} channels",
            device_name,
            source_rate,
            source_channels
        );

        let ring = Arc::new(AudioRingBuffer::new());
        let failed = Arc::new(AtomicBool::new(false));

        let callback_ring = ring.clone();
        let error_flag = failed.clone();

        let stream = device
            .build_input_stream(
                &supported_config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // LOCK-FREE: ring buffer write does not allocate
                    let written = callback_ring.write(data);
                    if written < data.len() {
                        tracing::warn!(
                            "Audio buffer overflow: dropped {} samples",
                            data.len() - written
                        );
                    }
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .context("Failed to build input stream")?;

        stream.play().context("Failed to start input stream")?;

        Ok(Self {
            _stream: stream,
            ring,
            failed,
            source_rate,
            source_channels,
            resample_acc: 0.0,
            pending: VecDeque::new(),
            scratch: vec![0.0; 4096],
        })
    }

    /// Drop everything captured so far, both raw and converted
    ///
    /// Used when a new pipeline phase starts and stale audio from the
    /// previous one must not leak into it.
    pub fn discard_pending(&mut self) {
        self.ring.clear();
        self.pending.clear();
        self.resample_acc = 0.0;
    }

    /// Fill `out` with the next 16kHz mono samples, blocking until enough
    /// audio has arrived
    ///
    /// Returns an error if the stream has failed or the device stops
    /// delivering samples for longer than the starvation timeout.
    pub fn read_frame(&mut self, out: &mut [f32]) -> Result<(), CaptureError> {
        let mut last_data = Instant::now();

        loop {
            if self.pending.len() >= out.len() {
                for sample in out.iter_mut() {
                    // Length checked above, pop cannot fail
                    *sample = self.pending.pop_front().unwrap_or(0.0);
                }
                return Ok(());
            }

            if self.failed.load(Ordering::SeqCst) {
                return Err(CaptureError::StreamFailed);
            }

            let read = self.ring.read(&mut self.scratch);
            if read > 0 {
                let raw: Vec<f32> = self.scratch[..read].to_vec();
                self.push_converted(&raw);
                last_data = Instant::now();
            } else {
                if last_data.elapsed() > STARVATION_TIMEOUT {
                    return Err(CaptureError::Starved(STARVATION_TIMEOUT));
                }
                std::thread::sleep(READ_POLL);
            }
        }
    }

    /// Downmix interleaved source samples to mono and decimate to the
    /// pipeline rate, carrying the fractional position across calls
    fn push_converted(&mut self, raw: &[f32]) {
        let step = self.source_rate as f64 / SAMPLE_RATE as f64;

        for frame in raw.chunks_exact(self.source_channels) {
            let mono: f32 = frame.iter().sum::<f32>() / frame.len() as f32;
            self.resample_acc += 1.0;
            while self.resample_acc >= step {
                self.resample_acc -= step;
                self.pending.push_back(mono);
            }
        }
    }
}

/// Convert pipeline f32 samples to the i16 format the recognisers expect
pub fn samples_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}
