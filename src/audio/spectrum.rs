//! Frequency-domain sampler: the newest window of microphone samples turned
//! into a smoothed dB magnitude spectrum.
//!
//! # Analysis chain
//!
//! ```text
//! shared ring buffer ─► newest fft_size samples ─► Blackman window ─► FFT
//!     ─► |X[k]| / N ─► s[k] = τ·s_prev[k] + (1−τ)·|X[k]| ─► 20·log10(s[k])
//! ```
//!
//! Only the first `fft_size / 2` bins are kept.  Exact silence yields `-inf`
//! dB, which downstream consumers treat as "no energy".
//!
//! The sampler never drains the ring buffer.  When the stream stops
//! delivering audio the same samples are analysed again and the frame
//! `sequence` stops advancing, which the engine uses to detect a stall.

use std::f32::consts::PI;
use std::sync::{Arc, MutexGuard};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::buffer::{RingBuffer, SharedSampleBuffer};
use super::capture::{AudioInitError, AudioStream};
use super::frame::{AudioFrame, FrameSource};
use crate::analysis::AnalysisFrameError;
use crate::config::SamplerConfig;

/// Smallest accepted transform size.
pub const MIN_FFT_SIZE: usize = 32;
/// Largest accepted transform size.
pub const MAX_FFT_SIZE: usize = 32_768;

// ---------------------------------------------------------------------------
// FrequencyDomainSampler
// ---------------------------------------------------------------------------

/// Owns the audio stream and the FFT state for one engine session.
pub struct FrequencyDomainSampler {
    stream: Option<Box<dyn AudioStream>>,
    buffer: SharedSampleBuffer,
    sample_rate: u32,
    config: SamplerConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Smoothed linear magnitude per bin, carried between frames.
    smoothed: Vec<f32>,
}

impl FrequencyDomainSampler {
    /// Take ownership of `stream` and build the analysis context.
    ///
    /// # Errors
    ///
    /// [`AudioInitError::InvalidConfig`] for an unusable `config` and
    /// [`AudioInitError::InvalidStream`] for a stream reporting a zero sample
    /// rate or one that is no longer active.  The stream is closed before any
    /// error is returned.
    pub fn open(mut stream: Box<dyn AudioStream>, config: &SamplerConfig) -> Result<Self, AudioInitError> {
        if let Err(e) = validate(config) {
            stream.close();
            return Err(e);
        }

        let sample_rate = stream.sample_rate();
        if sample_rate == 0 {
            stream.close();
            return Err(AudioInitError::InvalidStream("sample rate is 0 Hz".into()));
        }
        if !stream.is_active() {
            stream.close();
            return Err(AudioInitError::InvalidStream("stream is not active".into()));
        }

        let n = config.fft_size;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        log::debug!(
            "sampler opened: fft_size={n}, smoothing={}, {sample_rate} Hz",
            config.smoothing_time_constant
        );

        Ok(Self {
            buffer: stream.buffer(),
            stream: Some(stream),
            sample_rate,
            config: config.clone(),
            fft,
            window: blackman_window(n),
            spectrum: vec![Complex::new(0.0, 0.0); n],
            scratch,
            smoothed: vec![0.0; n / 2],
        })
    }

    /// Transform size in samples.
    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    /// Number of frequency bins (`fft_size / 2`).
    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Width of one frequency bin in Hz.
    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate as f64 / self.config.fft_size as f64
    }

    /// `false` after [`close`](FrameSource::close) or once the underlying
    /// stream has ended.
    pub fn is_stream_active(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    /// Newest `fft_size` samples, zero-padded at the front while the capture
    /// buffer is still filling.
    pub fn sample_time_domain(&self) -> Vec<f32> {
        let (samples, _) = self.snapshot();
        samples
    }

    /// Smoothed dB magnitude per bin for the current buffer contents.
    pub fn sample_frequency(&mut self) -> Vec<f32> {
        let (samples, _) = self.snapshot();
        self.analyse(&samples)
    }

    /// Copy the analysis window and the push counter under one lock.
    fn snapshot(&self) -> (Vec<f32>, u64) {
        let n = self.config.fft_size;
        let buf = lock_buffer(&self.buffer);
        let newest = buf.latest(n);
        let mut samples = vec![0.0; n - newest.len()];
        samples.extend_from_slice(&newest);
        (samples, buf.total_pushed())
    }

    fn analyse(&mut self, samples: &[f32]) -> Vec<f32> {
        let n = self.config.fft_size;
        for (slot, (&x, &w)) in self.spectrum.iter_mut().zip(samples.iter().zip(&self.window)) {
            *slot = Complex::new(x * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let tau = self.config.smoothing_time_constant;
        let norm = 1.0 / n as f32;
        self.smoothed
            .iter_mut()
            .zip(&self.spectrum)
            .map(|(s, x)| {
                let magnitude = x.norm() * norm;
                let next = tau * *s + (1.0 - tau) * magnitude;
                *s = if next.is_finite() { next } else { 0.0 };
                20.0 * s.log10()
            })
            .collect()
    }
}

impl FrameSource for FrequencyDomainSampler {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_frame(&mut self) -> Result<AudioFrame, AnalysisFrameError> {
        if self.stream.is_none() {
            return Err(AnalysisFrameError::Source("sampler is closed".into()));
        }
        let (samples, sequence) = self.snapshot();
        let frequency_db = self.analyse(&samples);
        Ok(AudioFrame::new(frequency_db, samples, self.sample_rate, sequence)
            .with_decibel_range(self.config.min_decibels, self.config.max_decibels))
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            log::debug!("sampler closed");
        }
    }
}

impl Drop for FrequencyDomainSampler {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate(config: &SamplerConfig) -> Result<(), AudioInitError> {
    let n = config.fft_size;
    if !n.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&n) {
        return Err(AudioInitError::InvalidConfig(format!(
            "fft_size must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}, got {n}"
        )));
    }
    let tau = config.smoothing_time_constant;
    if !(0.0..=1.0).contains(&tau) {
        return Err(AudioInitError::InvalidConfig(format!(
            "smoothing_time_constant must be within 0..=1, got {tau}"
        )));
    }
    if !(config.min_decibels.is_finite()
        && config.max_decibels.is_finite()
        && config.min_decibels < config.max_decibels)
    {
        return Err(AudioInitError::InvalidConfig(format!(
            "decibel range {}..{} is empty",
            config.min_decibels, config.max_decibels
        )));
    }
    Ok(())
}

/// Blackman window of length `n` (α = 0.16).
fn blackman_window(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * i as f32 / n as f32;
            A0 - A1 * phase.cos() + A2 * (2.0 * phase).cos()
        })
        .collect()
}

/// A panic on the capture thread must not take the analysis down with it.
fn lock_buffer(buffer: &SharedSampleBuffer) -> MutexGuard<'_, RingBuffer<f32>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::MockStream;
    use std::sync::atomic::Ordering;

    fn config(fft_size: usize, smoothing: f32) -> SamplerConfig {
        SamplerConfig {
            fft_size,
            smoothing_time_constant: smoothing,
            ..SamplerConfig::default()
        }
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    // ---- open --------------------------------------------------------------

    #[test]
    fn rejects_non_power_of_two_and_closes_stream() {
        let stream = MockStream::new(48_000, 4096);
        let closes = Arc::clone(&stream.closes);

        let err = FrequencyDomainSampler::open(Box::new(stream), &config(300, 0.8))
            .err()
            .expect("invalid fft size");
        assert!(matches!(err, AudioInitError::InvalidConfig(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_out_of_range_smoothing() {
        let stream = MockStream::new(48_000, 4096);
        let result = FrequencyDomainSampler::open(Box::new(stream), &config(256, 1.5));
        assert!(matches!(result, Err(AudioInitError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let stream = MockStream::new(0, 4096);
        let result = FrequencyDomainSampler::open(Box::new(stream), &SamplerConfig::default());
        assert!(matches!(result, Err(AudioInitError::InvalidStream(_))));
    }

    #[test]
    fn rejects_inactive_stream() {
        let stream = MockStream::new(48_000, 4096);
        stream.active.store(false, Ordering::SeqCst);
        let result = FrequencyDomainSampler::open(Box::new(stream), &SamplerConfig::default());
        assert!(matches!(result, Err(AudioInitError::InvalidStream(_))));
    }

    #[test]
    fn default_geometry() {
        let stream = MockStream::new(48_000, 4096);
        let sampler = FrequencyDomainSampler::open(Box::new(stream), &SamplerConfig::default())
            .expect("open");
        assert_eq!(sampler.fft_size(), 256);
        assert_eq!(sampler.bin_count(), 128);
        assert!((sampler.bin_width_hz() - 187.5).abs() < 1e-9);
    }

    // ---- spectrum ----------------------------------------------------------

    #[test]
    fn sine_peak_lands_in_expected_bin() {
        let sample_rate = 44_100;
        let n = 1024;
        let stream = MockStream::new(sample_rate, 4096);
        let buffer = Arc::clone(&stream.buffer);
        let mut sampler =
            FrequencyDomainSampler::open(Box::new(stream), &config(n, 0.0)).expect("open");

        let bin = 10;
        let freq = bin as f32 * sample_rate as f32 / n as f32;
        buffer.lock().unwrap().push_slice(&sine(freq, sample_rate, n));

        let spectrum = sampler.sample_frequency();
        assert_eq!(spectrum.len(), n / 2);
        assert_eq!(argmax(&spectrum), bin);
    }

    #[test]
    fn silence_is_negative_infinity() {
        let stream = MockStream::new(48_000, 4096);
        let mut sampler =
            FrequencyDomainSampler::open(Box::new(stream), &SamplerConfig::default()).expect("open");
        let spectrum = sampler.sample_frequency();
        assert!(spectrum.iter().all(|&db| db == f32::NEG_INFINITY));
    }

    #[test]
    fn smoothing_carries_energy_between_frames() {
        let stream = MockStream::new(44_100, 4096);
        let buffer = Arc::clone(&stream.buffer);
        let mut sampler =
            FrequencyDomainSampler::open(Box::new(stream), &config(256, 0.8)).expect("open");
        buffer.lock().unwrap().push_slice(&sine(1_722.66, 44_100, 256));

        let first = sampler.sample_frequency();
        let second = sampler.sample_frequency();
        let peak = argmax(&second);

        // s1 = 0.2·m, s2 = 0.36·m
        let expected = 20.0 * (0.36_f32 / 0.2).log10();
        assert!((second[peak] - first[peak] - expected).abs() < 1e-3);
    }

    // ---- time domain -------------------------------------------------------

    #[test]
    fn time_domain_is_zero_padded_while_filling() {
        let stream = MockStream::new(48_000, 4096);
        let buffer = Arc::clone(&stream.buffer);
        let sampler =
            FrequencyDomainSampler::open(Box::new(stream), &config(32, 0.8)).expect("open");
        buffer.lock().unwrap().push_slice(&[0.1, 0.2, 0.3]);

        let samples = sampler.sample_time_domain();
        assert_eq!(samples.len(), 32);
        assert!(samples[..29].iter().all(|&s| s == 0.0));
        assert_eq!(&samples[29..], &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn ended_stream_keeps_last_known_buffer() {
        let stream = MockStream::new(48_000, 4096);
        let buffer = Arc::clone(&stream.buffer);
        let active = Arc::clone(&stream.active);
        let mut sampler =
            FrequencyDomainSampler::open(Box::new(stream), &config(64, 0.8)).expect("open");
        buffer.lock().unwrap().push_slice(&sine(3_000.0, 48_000, 64));

        let before = sampler.next_frame().expect("frame");
        active.store(false, Ordering::SeqCst);
        let after = sampler.next_frame().expect("frame");

        assert!(!sampler.is_stream_active());
        assert_eq!(before.time_domain, after.time_domain);
        assert_eq!(before.sequence, 64);
        assert_eq!(after.sequence, 64);
    }

    // ---- FrameSource -------------------------------------------------------

    #[test]
    fn frame_carries_config_decibel_range() {
        let stream = MockStream::new(48_000, 4096);
        let cfg = SamplerConfig {
            min_decibels: -90.0,
            max_decibels: -10.0,
            ..SamplerConfig::default()
        };
        let mut sampler = FrequencyDomainSampler::open(Box::new(stream), &cfg).expect("open");
        let frame = sampler.next_frame().expect("frame");
        assert_eq!(frame.min_decibels, -90.0);
        assert_eq!(frame.max_decibels, -10.0);
        assert_eq!(frame.sample_rate, 48_000);
        assert_eq!(frame.time_domain.len(), 256);
        assert_eq!(frame.frequency_db.len(), 128);
    }

    #[test]
    fn close_is_idempotent_and_ends_frames() {
        let stream = MockStream::new(48_000, 4096);
        let closes = Arc::clone(&stream.closes);
        let mut sampler =
            FrequencyDomainSampler::open(Box::new(stream), &SamplerConfig::default()).expect("open");

        sampler.close();
        sampler.close();
        drop(sampler);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn next_frame_after_close_is_source_error() {
        let stream = MockStream::new(48_000, 4096);
        let mut sampler =
            FrequencyDomainSampler::open(Box::new(stream), &SamplerConfig::default()).expect("open");
        sampler.close();
        assert!(matches!(sampler.next_frame(), Err(AnalysisFrameError::Source(_))));
    }

    #[test]
    fn blackman_window_endpoints() {
        let w = blackman_window(8);
        assert!(w[0].abs() < 1e-6);
        assert!((w[4] - 1.0).abs() < 1e-6);
    }
}
