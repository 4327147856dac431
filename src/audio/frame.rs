//! One analysis snapshot of the microphone signal.
//!
//! An [`AudioFrame`] is produced once per metrics tick and then only ever
//! shared behind an `Arc`; the render loop reads whichever frame is newest.

use std::time::Instant;

use crate::analysis::AnalysisFrameError;

/// Default lower bound of the dB range mapped to byte magnitudes.
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
/// Default upper bound of the dB range mapped to byte magnitudes.
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// Frequency and time-domain view of the signal at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Smoothed magnitude per bin in dB (`fft_size / 2` entries).
    /// Exact silence is `-inf`.
    pub frequency_db: Vec<f32>,
    /// Newest `fft_size` raw samples in `[-1.0, 1.0]`.
    pub time_domain: Vec<f32>,
    /// Sample rate of the source, in Hz.
    pub sample_rate: u32,
    /// Number of samples the source had received when this frame was taken.
    pub sequence: u64,
    /// When the frame was assembled.
    pub captured_at: Instant,
    /// dB value mapped to byte 0.
    pub min_decibels: f32,
    /// dB value mapped to byte 255.
    pub max_decibels: f32,
}

impl AudioFrame {
    /// Build a frame with the default −100..−30 dB byte range.
    pub fn new(frequency_db: Vec<f32>, time_domain: Vec<f32>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            frequency_db,
            time_domain,
            sample_rate,
            sequence,
            captured_at: Instant::now(),
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
        }
    }

    /// Replace the dB range used by [`byte_frequency`](Self::byte_frequency).
    pub fn with_decibel_range(mut self, min_decibels: f32, max_decibels: f32) -> Self {
        self.min_decibels = min_decibels;
        self.max_decibels = max_decibels;
        self
    }

    /// Number of frequency bins.
    pub fn bin_count(&self) -> usize {
        self.frequency_db.len()
    }

    /// Magnitude of bin `i` scaled into `0..=255` over the frame's dB range.
    ///
    /// Values at or below `min_decibels` (including `-inf`) map to 0, values
    /// at or above `max_decibels` map to 255.
    pub fn byte_at(&self, i: usize) -> u8 {
        let Some(&db) = self.frequency_db.get(i) else {
            return 0;
        };
        let range = self.max_decibels - self.min_decibels;
        if !db.is_finite() || range <= 0.0 {
            return if db == f32::INFINITY { 255 } else { 0 };
        }
        let scaled = 255.0 * (db - self.min_decibels) / range;
        scaled.clamp(0.0, 255.0) as u8
    }

    /// All bins as bytes; see [`byte_at`](Self::byte_at).
    ///
    /// ```rust
    /// use vocal_coach::audio::AudioFrame;
    ///
    /// let frame = AudioFrame::new(vec![f32::NEG_INFINITY, -100.0, -65.0, -30.0, 0.0], vec![], 48_000, 0);
    /// assert_eq!(frame.byte_frequency(), vec![0, 0, 127, 255, 255]);
    /// ```
    pub fn byte_frequency(&self) -> Vec<u8> {
        (0..self.frequency_db.len()).map(|i| self.byte_at(i)).collect()
    }
}

// ---------------------------------------------------------------------------
// FrameSource
// ---------------------------------------------------------------------------

/// Anything the metrics engine can pull frames from.
///
/// [`FrequencyDomainSampler`](crate::audio::FrequencyDomainSampler) is the
/// microphone-backed implementation.  A source is owned by exactly one engine
/// session and closed when that session stops.
pub trait FrameSource: Send {
    /// Sample rate of the frames this source produces, in Hz.
    fn sample_rate(&self) -> u32;

    /// Assemble the frame for the current tick.
    fn next_frame(&mut self) -> Result<AudioFrame, AnalysisFrameError>;

    /// Release the underlying stream.  Must be idempotent.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_at_out_of_range_index_is_zero() {
        let frame = AudioFrame::new(vec![-30.0], vec![], 44_100, 0);
        assert_eq!(frame.byte_at(5), 0);
    }

    #[test]
    fn custom_decibel_range_rescales() {
        let frame = AudioFrame::new(vec![-50.0], vec![], 44_100, 0).with_decibel_range(-60.0, -40.0);
        assert_eq!(frame.byte_at(0), 127);
    }

    #[test]
    fn nan_maps_to_zero() {
        let frame = AudioFrame::new(vec![f32::NAN], vec![], 44_100, 0);
        assert_eq!(frame.byte_frequency(), vec![0]);
    }

    #[test]
    fn bin_count_matches_spectrum() {
        let frame = AudioFrame::new(vec![0.0; 128], vec![0.0; 256], 48_000, 9);
        assert_eq!(frame.bin_count(), 128);
        assert_eq!(frame.sequence, 9);
    }
}
