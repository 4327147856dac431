//! Channel mixing and sample-format conversion for the capture callback.
//!
//! The spectrum sampler analyses a **mono `f32`** signal.  Input devices
//! deliver interleaved frames in whatever channel count and sample format the
//! platform prefers, so the capture callback runs every buffer through:
//!
//! 1. [`i16_to_f32`] / [`u16_to_f32`]: integer formats to `[-1.0, 1.0]`.
//! 2. [`stereo_to_mono`]: average interleaved channels down to mono.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is ignored.
///
/// * If `channels == 1` the input is copied unchanged.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use vocal_coach::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Integer sample formats
// ---------------------------------------------------------------------------

/// Convert signed 16-bit PCM to `f32` in `[-1.0, 1.0)`.
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32_768.0).collect()
}

/// Convert unsigned 16-bit PCM (midpoint 32 768) to `f32` in `[-1.0, 1.0)`.
pub fn u16_to_f32(samples: &[u16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (s as f32 - 32_768.0) / 32_768.0)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let input = vec![1.0_f32, -1.0, 0.5, 0.5];
        let out = stereo_to_mono(&input, 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_drops_partial_frame() {
        let input = vec![0.4_f32, 0.4, 0.4, 0.4, 0.9];
        let out = stereo_to_mono(&input, 4);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn i16_extremes_map_to_unit_range() {
        let out = i16_to_f32(&[i16::MIN, 0, i16::MAX]);
        assert!((out[0] + 1.0).abs() < 1e-6);
        assert_eq!(out[1], 0.0);
        assert!(out[2] < 1.0 && out[2] > 0.999);
    }

    #[test]
    fn u16_midpoint_is_silence() {
        let out = u16_to_f32(&[32_768, 0]);
        assert_eq!(out[0], 0.0);
        assert!((out[1] + 1.0).abs() < 1e-6);
    }
}
