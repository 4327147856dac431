//! Fixed-capacity circular (ring) buffer.
//!
//! When the buffer is full, new items **overwrite** the oldest data so that
//! the most-recent `capacity` items are always available.  Two parts of the
//! engine rely on it:
//!
//! * the shared microphone buffer, where the capture thread pushes samples
//!   and the spectrum sampler reads the newest window without draining, and
//! * the pitch history of the [`StabilityTracker`](crate::analysis::StabilityTracker).
//!
//! # Example
//!
//! ```rust
//! use vocal_coach::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 items → capacity 4 → oldest dropped
//! assert_eq!(buf.to_vec(), vec![2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(buf.latest(2), vec![4.0, 5.0]);
//! assert_eq!(buf.total_pushed(), 5);
//! ```

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular buffer.
///
/// Generic over `T: Copy + Default` so it can store audio samples (`f32`) as
/// well as pitch estimates (`f64`).
///
/// ## Overflow behaviour
///
/// When a push would exceed `capacity`, the oldest items are silently
/// overwritten.  The buffer never allocates beyond its initial capacity.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid items currently stored (≤ `capacity`).
    len: usize,
    /// Items pushed since construction or the last [`clear`](Self::clear).
    total_pushed: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
            total_pushed: 0,
        }
    }

    /// Append a single item, evicting the oldest one when full.
    pub fn push(&mut self, item: T) {
        self.buf[self.write_pos] = item;
        self.write_pos = (self.write_pos + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
        self.total_pushed += 1;
    }

    /// Append `data` to the buffer.
    ///
    /// If the total number of items exceeds `capacity`, the oldest items are
    /// overwritten (circular behaviour).
    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            self.push(item);
        }
    }

    /// Iterate over the stored items in chronological order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        // Before the first overflow valid data starts at 0; afterwards the
        // oldest item sits at `write_pos`.
        let read_pos = if self.len < self.capacity {
            0
        } else {
            self.write_pos
        };
        (0..self.len).map(move |i| self.buf[(read_pos + i) % self.capacity])
    }

    /// Copy all stored items in chronological order without consuming them.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// The newest `n` items in chronological order.
    ///
    /// Returns fewer than `n` items while the buffer is still filling.
    pub fn latest(&self, n: usize) -> Vec<T> {
        let n = n.min(self.len);
        self.iter().skip(self.len - n).collect()
    }

    /// Discard all items and reset the write position and push counter.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
        self.total_pushed = 0;
    }

    /// Number of valid items currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the buffer contains no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of items the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` when the buffer holds `capacity` items, i.e. the next
    /// push evicts the oldest one.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Monotonic count of items pushed so far.
    ///
    /// The spectrum sampler stamps every frame with this value; a value that
    /// stops advancing means the audio source has stalled.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
}

// ---------------------------------------------------------------------------
// SharedSampleBuffer
// ---------------------------------------------------------------------------

/// Thread-safe sample buffer shared between the capture thread (writer) and
/// the [`FrequencyDomainSampler`](crate::audio::FrequencyDomainSampler)
/// (reader).
pub type SharedSampleBuffer = Arc<Mutex<RingBuffer<f32>>>;

/// Construct a new [`SharedSampleBuffer`] holding `capacity` mono samples.
pub fn new_shared_buffer(capacity: usize) -> SharedSampleBuffer {
    Arc::new(Mutex::new(RingBuffer::new(capacity)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
