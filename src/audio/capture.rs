//! Microphone capture via `cpal`.
//!
//! The engine never talks to `cpal` directly.  It depends on two narrow
//! capabilities:
//!
//! * [`AudioInput`]: "open an audio stream" (grant/deny is decided here).
//! * [`AudioStream`]: a live stream handle: sample rate, the shared mono
//!   sample buffer the stream writes into, and liveness.
//!
//! [`CpalInput`] is the production implementation.  A `cpal::Stream` is not
//! `Send` on every platform, so the stream is built and kept alive on a
//! dedicated `mic-capture` thread; the [`CpalStream`] handle returned to the
//! caller only holds the shared buffer and a shutdown channel.  Dropping or
//! closing the handle stops the hardware stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use thiserror::Error;

use super::buffer::{new_shared_buffer, SharedSampleBuffer};
use super::downmix::{i16_to_f32, stereo_to_mono, u16_to_f32};

// ---------------------------------------------------------------------------
// AudioInitError
// ---------------------------------------------------------------------------

/// Errors raised while acquiring the microphone or building the analysis
/// context.  This is the only error type that crosses the engine boundary.
#[derive(Debug, Error)]
pub enum AudioInitError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device `{0}` not found")]
    DeviceNotFound(String),

    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid audio stream: {0}")]
    InvalidStream(String),

    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),

    #[error("no tokio runtime available to drive the analysis loop")]
    NoRuntime,

    #[error("capture thread failed: {0}")]
    CaptureThread(String),
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A live audio input handle.
///
/// The stream writes mono `f32` samples into [`buffer`](Self::buffer); the
/// spectrum sampler only ever reads from that buffer.
pub trait AudioStream: Send {
    /// Sample rate of the samples written into the buffer, in Hz.
    fn sample_rate(&self) -> u32;

    /// The shared buffer this stream writes into.
    fn buffer(&self) -> SharedSampleBuffer;

    /// `false` once the stream has ended or the device went away.
    fn is_active(&self) -> bool;

    /// Release the underlying device.  Must be idempotent.
    fn close(&mut self);
}

/// Microphone-access capability injected into the engine's caller.
pub trait AudioInput: Send + Sync {
    /// Acquire the input device and start streaming.
    ///
    /// # Errors
    ///
    /// Returns [`AudioInitError`] when the platform denies access or no
    /// usable device exists.
    fn open_stream(&self) -> Result<Box<dyn AudioStream>, AudioInitError>;
}

// ---------------------------------------------------------------------------
// CpalInput
// ---------------------------------------------------------------------------

/// Opens the system (or a named) input device through `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use vocal_coach::audio::{AudioInput, CpalInput};
///
/// let input = CpalInput::new(None, 48_000);
/// let mut stream = input.open_stream().unwrap();
/// println!("capturing at {} Hz", stream.sample_rate());
/// stream.close();
/// ```
#[derive(Debug, Clone)]
pub struct CpalInput {
    /// Device name to open; `None` selects the host default.
    device_name: Option<String>,
    /// Capacity of the shared mono sample buffer.
    buffer_capacity: usize,
}

impl CpalInput {
    /// Create an input for `device_name` (or the default device) whose
    /// streams keep the newest `buffer_capacity` mono samples.
    pub fn new(device_name: Option<String>, buffer_capacity: usize) -> Self {
        Self {
            device_name,
            buffer_capacity: buffer_capacity.max(1),
        }
    }
}

impl AudioInput for CpalInput {
    fn open_stream(&self) -> Result<Box<dyn AudioStream>, AudioInitError> {
        let buffer = new_shared_buffer(self.buffer_capacity);
        let active = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, AudioInitError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let device_name = self.device_name.clone();
        let thread_buffer = Arc::clone(&buffer);
        let thread_active = Arc::clone(&active);

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                match build_stream(device_name.as_deref(), thread_buffer, thread_active) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        // Blocks until the handle is closed or dropped.
                        let _ = shutdown_rx.recv();
                        drop(stream);
                        log::debug!("mic-capture: stream released");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| AudioInitError::CaptureThread(e.to_string()))?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioInitError::CaptureThread(
                    "capture thread exited before the stream was ready".into(),
                ));
            }
        };

        log::info!("audio capture started ({sample_rate} Hz)");

        Ok(Box::new(CpalStream {
            sample_rate,
            buffer,
            active,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }))
    }
}

/// Names of all input devices on the default host (for the settings panel).
pub fn input_device_names() -> Vec<String> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            log::warn!("could not enumerate input devices: {e}");
            Vec::new()
        }
    }
}

/// Build and start the cpal stream.  Runs on the capture thread.
fn build_stream(
    device_name: Option<&str>,
    buffer: SharedSampleBuffer,
    active: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32), AudioInitError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioInitError::InvalidStream(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioInitError::DeviceNotFound(name.to_string()))?,
        None => host.default_input_device().ok_or(AudioInitError::NoDevice)?,
    };

    log::info!(
        "selected input device: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels;
    let sample_rate = config.sample_rate.0;

    log::debug!("input config: {sample_format:?} @ {sample_rate} Hz, {channels} ch");

    let push = move |mono: &[f32]| {
        if let Ok(mut buf) = buffer.lock() {
            buf.push_slice(mono);
        }
    };

    let stream = match sample_format {
        SampleFormat::F32 => {
            let push = push.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push(&stereo_to_mono(data, channels));
                },
                error_callback(Arc::clone(&active)),
                None,
            )?
        }
        SampleFormat::I16 => {
            let push = push.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    push(&stereo_to_mono(&i16_to_f32(data), channels));
                },
                error_callback(Arc::clone(&active)),
                None,
            )?
        }
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                push(&stereo_to_mono(&u16_to_f32(data), channels));
            },
            error_callback(Arc::clone(&active)),
            None,
        )?,
        other => return Err(AudioInitError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    Ok((stream, sample_rate))
}

/// Stream error handler: an unplugged device marks the stream inactive.
fn error_callback(active: Arc<AtomicBool>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err: cpal::StreamError| {
        log::error!("cpal stream error: {err}");
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            active.store(false, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// CpalStream
// ---------------------------------------------------------------------------

/// Handle to a stream running on the `mic-capture` thread.
pub struct CpalStream {
    sample_rate: u32,
    buffer: SharedSampleBuffer,
    active: Arc<AtomicBool>,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer(&self) -> SharedSampleBuffer {
        Arc::clone(&self.buffer)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        // Dropping the sender wakes the capture thread.
        if self.shutdown.take().is_some() {
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    log::warn!("mic-capture thread panicked during shutdown");
                }
            }
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// MockStream (tests only)
// ---------------------------------------------------------------------------

/// An [`AudioStream`] whose buffer is filled by the test itself.
#[cfg(test)]
pub struct MockStream {
    pub sample_rate: u32,
    pub buffer: SharedSampleBuffer,
    pub active: Arc<AtomicBool>,
    pub closes: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl MockStream {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        Self {
            sample_rate,
            buffer: new_shared_buffer(capacity),
            active: Arc::new(AtomicBool::new(true)),
            closes: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }
}

#[cfg(test)]
impl AudioStream for MockStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer(&self) -> SharedSampleBuffer {
        Arc::clone(&self.buffer)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
