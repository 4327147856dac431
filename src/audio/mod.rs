//! Audio input: microphone capture → shared ring buffer → spectrum frames.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback (mic-capture thread) → downmix to mono
//!           → SharedSampleBuffer → FrequencyDomainSampler → AudioFrame
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use vocal_coach::audio::{AudioInput, CpalInput, FrameSource, FrequencyDomainSampler};
//! use vocal_coach::config::SamplerConfig;
//!
//! let input = CpalInput::new(None, 16_384);
//! let stream = input.open_stream().unwrap();
//! let mut sampler = FrequencyDomainSampler::open(stream, &SamplerConfig::default()).unwrap();
//!
//! let frame = sampler.next_frame().unwrap();
//! println!("{} bins @ {} Hz", frame.bin_count(), frame.sample_rate);
//! sampler.close();
//! ```

pub mod buffer;
pub mod capture;
pub mod downmix;
pub mod frame;
pub mod spectrum;

pub use buffer::{new_shared_buffer, RingBuffer, SharedSampleBuffer};
pub use capture::{input_device_names, AudioInitError, AudioInput, AudioStream, CpalInput, CpalStream};
pub use downmix::{i16_to_f32, stereo_to_mono, u16_to_f32};
pub use frame::{AudioFrame, FrameSource, DEFAULT_MAX_DECIBELS, DEFAULT_MIN_DECIBELS};
pub use spectrum::FrequencyDomainSampler;
