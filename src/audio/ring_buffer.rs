//! Lock-free ring buffer between the audio callback and the listener
//!
//! The cpal callback runs on a real-time thread and must not allocate or
//! block, so all storage is pre-allocated and both ends use atomic indices.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ring buffer size in samples. At 48kHz stereo this holds roughly a third
/// of a second of raw input, far more than one poll interval.
const BUFFER_SIZE: usize = 32768;

/// A lock-free single-producer single-consumer ring buffer for audio samples
///
/// Single producer (the audio callback) and single consumer (the listener
/// thread). Writes never block; when the consumer falls behind, excess
/// samples are dropped and the caller is told how many were accepted.
pub struct AudioRingBuffer {
    buffer: UnsafeCell<Box<[f32; BUFFER_SIZE]>>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// Safety: SPSC with atomic indices. The producer only advances write_pos
// after its samples are stored, the consumer only advances read_pos after
// its samples are copied out, so the two never touch the same slots.
unsafe impl Send for AudioRingBuffer {}
unsafe impl Sync for AudioRingBuffer {}

impl Default for AudioRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRingBuffer {
    /// Create a new ring buffer with pre-allocated storage
    pub fn new() -> Self {
        Self {
            buffer: UnsafeCell::new(Box::new([0.0; BUFFER_SIZE])),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    /// Number of samples available for reading
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);

        if write >= read {
            write - read
        } else {
            BUFFER_SIZE - read + write
        }
    }

    /// Write samples from the audio callback. Lock-free, never allocates.
    ///
    /// Returns the number of samples accepted; the rest are dropped when
    /// the buffer is full.
    pub fn write(&self, samples: &[f32]) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);

        // One slot stays empty so a full buffer is distinguishable from
        // an empty one.
        let free = if write >= read {
            BUFFER_SIZE - (write - read) - 1
        } else {
            read - write - 1
        };

        let to_write = samples.len().min(free);
        if to_write == 0 {
            return 0;
        }

        let buffer_ptr = self.buffer.get();
        for (i, &sample) in samples.iter().enumerate().take(to_write) {
            // Safety: the consumer never reads past write_pos, which has
            // not advanced over these slots yet.
            unsafe {
                (*buffer_ptr)[(write + i) % BUFFER_SIZE] = sample;
            }
        }

        self.write_pos
            .store((write + to_write) % BUFFER_SIZE, Ordering::Release);
        to_write
    }

    /// Read samples into `output`, returning how many were copied
    pub fn read(&self, output: &mut [f32]) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);

        let available = if write >= read {
            write - read
        } else {
            BUFFER_SIZE - read + write
        };

        let to_read = output.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let buffer_ptr = self.buffer.get();
        for (i, sample) in output.iter_mut().enumerate().take(to_read) {
            // Safety: the producer never writes between read_pos and
            // write_pos, which bound these slots.
            *sample = unsafe { (*buffer_ptr)[(read + i) % BUFFER_SIZE] };
        }

        self.read_pos
            .store((read + to_read) % BUFFER_SIZE, Ordering::Release);
        to_read
    }

    /// Discard everything currently buffered
    pub fn clear(&self) {
        self.read_pos
            .store(self.write_pos.load(Ordering::Acquire), Ordering::Release);
    }
}
