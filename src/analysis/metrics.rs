//! Per-tick vocal metrics.
//!
//! [`MetricsAnalyzer`] turns one [`AudioFrame`] into one [`VocalMetrics`]
//! snapshot:
//!
//! | Metric       | Derivation                                                  |
//! |--------------|-------------------------------------------------------------|
//! | `pitch`      | [`PitchEstimator`] peak, cents relative to A4               |
//! | `volume`     | RMS of `10^(dB/20)` over all bins × 100, clamped 0..=100    |
//! | `stability`  | [`StabilityTracker`] score after pushing `pitch`            |
//! | `in_tune`    | target set and `|pitch − target| < 50`                      |
//! | `confidence` | `min(100, volume/50 · stability/100 · 100)`, clamped 0..=100 |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pitch::{PitchEstimator, PitchSample, TargetPitch};
use super::stability::StabilityTracker;
use crate::audio::AudioFrame;

/// Maximum distance from the target, exclusive, that still counts as in tune.
pub const IN_TUNE_THRESHOLD_CENTS: f64 = 50.0;

// ---------------------------------------------------------------------------
// VocalMetrics
// ---------------------------------------------------------------------------

/// One snapshot of the singer's voice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VocalMetrics {
    /// Cents relative to A4; `0.0` when no pitch was detected.
    pub pitch: PitchSample,
    /// Loudness, `0.0..=100.0`.
    pub volume: f64,
    /// Pitch steadiness over the recent history, `0.0..=100.0`.
    pub stability: f64,
    /// Within 50 cents of the target (always `false` without a target).
    pub in_tune: bool,
    /// Combined volume/stability score, `0.0..=100.0`.
    pub confidence: f64,
    /// Time since the engine session started.
    pub timestamp: Duration,
    /// Tick index within the session.
    pub sequence: u64,
    /// The audio source has not delivered new samples for longer than the
    /// stall grace period.
    pub stalled: bool,
    /// `false` for substituted snapshots (analysis failure or stall).
    pub signal: bool,
}

impl VocalMetrics {
    /// Substitute snapshot emitted when a frame could not be analysed:
    /// silent, unconfident and out of tune, keeping the last stability.
    pub fn no_signal(stability: f64, timestamp: Duration, sequence: u64) -> Self {
        Self {
            pitch: 0.0,
            volume: 0.0,
            stability,
            in_tune: false,
            confidence: 0.0,
            timestamp,
            sequence,
            stalled: false,
            signal: false,
        }
    }

    /// Like [`no_signal`](Self::no_signal) but flagged as stalled.
    pub fn stalled(stability: f64, timestamp: Duration, sequence: u64) -> Self {
        Self {
            stalled: true,
            ..Self::no_signal(stability, timestamp, sequence)
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisFrameError
// ---------------------------------------------------------------------------

/// A single frame could not be analysed.  Never fatal: the engine logs it
/// and emits a [`VocalMetrics::no_signal`] snapshot instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisFrameError {
    #[error("frame has an empty spectrum")]
    EmptySpectrum,

    #[error("frame reports an invalid sample rate ({0} Hz)")]
    InvalidSampleRate(u32),

    #[error("frame contains non-finite magnitudes")]
    NonFinite,

    #[error("frame source failed: {0}")]
    Source(String),
}

// ---------------------------------------------------------------------------
// Scalar metrics
// ---------------------------------------------------------------------------

/// RMS of the linear magnitudes of `frequency_db`, scaled to `0..=100`.
///
/// `-inf` bins count as silence.  An empty spectrum has volume 0.
pub fn volume(frequency_db: &[f32]) -> f64 {
    if frequency_db.is_empty() {
        return 0.0;
    }
    let mean_square = frequency_db
        .iter()
        .map(|&db| {
            let amplitude = 10f64.powf(f64::from(db) / 20.0);
            if amplitude.is_finite() {
                amplitude * amplitude
            } else {
                0.0
            }
        })
        .sum::<f64>()
        / frequency_db.len() as f64;
    let v = mean_square.sqrt() * 100.0;
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Confidence from (already clamped) volume and stability.
///
/// ```rust
/// use vocal_coach::analysis::confidence;
///
/// assert_eq!(confidence(25.0, 100.0), 50.0);
/// assert_eq!(confidence(80.0, 100.0), 100.0);
/// assert_eq!(confidence(80.0, 0.0), 0.0);
/// ```
pub fn confidence(volume: f64, stability: f64) -> f64 {
    let c = (volume / 50.0) * (stability / 100.0) * 100.0;
    if c.is_nan() {
        return 0.0;
    }
    c.min(100.0).clamp(0.0, 100.0)
}

/// Strictly within [`IN_TUNE_THRESHOLD_CENTS`] of the target.
pub fn is_in_tune(pitch: PitchSample, target: Option<TargetPitch>) -> bool {
    target.is_some_and(|t| (pitch - t.cents()).abs() < IN_TUNE_THRESHOLD_CENTS)
}

// ---------------------------------------------------------------------------
// MetricsAnalyzer
// ---------------------------------------------------------------------------

/// Frame-to-metrics pipeline for one engine session.
///
/// Owns the pitch history; a new session starts with a new analyzer.
#[derive(Debug, Clone, Default)]
pub struct MetricsAnalyzer {
    estimator: PitchEstimator,
    tracker: StabilityTracker,
}

impl MetricsAnalyzer {
    /// Analyzer whose stability is computed over `history_size` samples.
    pub fn new(history_size: usize) -> Self {
        Self {
            estimator: PitchEstimator::new(),
            tracker: StabilityTracker::new(history_size),
        }
    }

    /// Analyse one frame.
    ///
    /// The pitch history is only updated when the frame is valid.
    ///
    /// # Errors
    ///
    /// [`AnalysisFrameError`] when the frame has no bins, a zero sample rate
    /// or NaN / `+inf` magnitudes.
    pub fn analyze(
        &mut self,
        frame: &AudioFrame,
        target: Option<TargetPitch>,
        timestamp: Duration,
        sequence: u64,
    ) -> Result<VocalMetrics, AnalysisFrameError> {
        validate_frame(frame)?;

        let volume = volume(&frame.frequency_db);
        let pitch = self.estimator.estimate(&frame.frequency_db, frame.sample_rate);
        self.tracker.push(pitch);
        let stability = self.tracker.stability();

        Ok(VocalMetrics {
            pitch,
            volume,
            stability,
            in_tune: is_in_tune(pitch, target),
            confidence: confidence(volume, stability),
            timestamp,
            sequence,
            stalled: false,
            signal: true,
        })
    }

    /// Current stability without pushing a sample.
    pub fn stability(&self) -> f64 {
        self.tracker.stability()
    }

    /// Number of pitch samples currently held.
    pub fn history_len(&self) -> usize {
        self.tracker.len()
    }

    /// Forget the pitch history.
    pub fn reset(&mut self) {
        self.tracker.reset();
    }
}

fn validate_frame(frame: &AudioFrame) -> Result<(), AnalysisFrameError> {
    if frame.frequency_db.is_empty() {
        return Err(AnalysisFrameError::EmptySpectrum);
    }
    if frame.sample_rate == 0 {
        return Err(AnalysisFrameError::InvalidSampleRate(frame.sample_rate));
    }
    if frame
        .frequency_db
        .iter()
        .any(|db| db.is_nan() || *db == f32::INFINITY)
    {
        return Err(AnalysisFrameError::NonFinite);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 45_056;
    const BINS: usize = 1_024;

    /// 0 dB at 440 Hz over a −3 dB floor.
    fn steady_a4() -> AudioFrame {
        let mut db = vec![-3.0_f32; BINS];
        db[20] = 0.0;
        AudioFrame::new(db, vec![0.0; 2 * BINS], SR, 0)
    }

    fn frame_at_cents(cents: f64) -> AudioFrame {
        let hz = crate::analysis::cents_to_hz(cents);
        let bin = (hz * 2.0 * BINS as f64 / SR as f64).round() as usize;
        let mut db = vec![-40.0_f32; BINS];
        db[bin] = -5.0;
        AudioFrame::new(db, vec![], SR, 0)
    }

    // ---- volume ------------------------------------------------------------

    #[test]
    fn volume_of_silence_is_zero() {
        assert_eq!(volume(&vec![f32::NEG_INFINITY; 64]), 0.0);
        assert_eq!(volume(&[]), 0.0);
    }

    #[test]
    fn volume_of_full_scale_is_clamped() {
        assert_eq!(volume(&vec![0.0; 64]), 100.0);
        assert_eq!(volume(&vec![20.0; 64]), 100.0);
    }

    #[test]
    fn volume_of_minus_20_db_is_ten() {
        assert!((volume(&vec![-20.0; 64]) - 10.0).abs() < 1e-9);
    }

    // ---- confidence --------------------------------------------------------

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(confidence(100.0, 100.0), 100.0);
        assert_eq!(confidence(0.0, 100.0), 0.0);
        assert_eq!(confidence(-5.0, 100.0), 0.0);
        assert_eq!(confidence(f64::NAN, 100.0), 0.0);
        assert!((confidence(40.0, 50.0) - 40.0).abs() < 1e-9);
    }

    // ---- in tune -----------------------------------------------------------

    #[test]
    fn in_tune_boundary_is_strict() {
        let t = Some(TargetPitch::from_cents(200.0));
        assert!(is_in_tune(249.0, t));
        assert!(is_in_tune(151.0, t));
        assert!(!is_in_tune(250.0, t));
        assert!(!is_in_tune(251.0, t));
        assert!(!is_in_tune(200.0, None));
    }

    // ---- analyzer ----------------------------------------------------------

    #[test]
    fn steady_a4_reaches_full_confidence() {
        let mut analyzer = MetricsAnalyzer::default();
        let target = Some(TargetPitch::from_cents(0.0));
        let mut last = None;
        for seq in 0..10 {
            last = Some(
                analyzer
                    .analyze(&steady_a4(), target, Duration::from_millis(seq * 16), seq)
                    .expect("valid frame"),
            );
        }
        let m = last.expect("ten ticks");
        assert!(m.pitch.abs() < 1e-9);
        assert_eq!(m.stability, 100.0);
        assert!(m.in_tune);
        assert!((m.volume - 70.83).abs() < 0.01, "volume {}", m.volume);
        assert_eq!(m.confidence, 100.0);
        assert!(m.signal && !m.stalled);
    }

    #[test]
    fn first_tick_has_zero_stability() {
        let mut analyzer = MetricsAnalyzer::default();
        let m = analyzer
            .analyze(&steady_a4(), None, Duration::ZERO, 0)
            .expect("valid frame");
        assert_eq!(m.stability, 0.0);
        assert_eq!(m.confidence, 0.0);
        assert!(!m.in_tune);
    }

    #[test]
    fn singing_near_target_is_in_tune() {
        let mut analyzer = MetricsAnalyzer::default();
        let target = Some(TargetPitch::from_cents(0.0));
        let m = analyzer
            .analyze(&frame_at_cents(0.0), target, Duration::ZERO, 0)
            .expect("valid frame");
        assert!(m.in_tune);

        let m = analyzer
            .analyze(&frame_at_cents(700.0), target, Duration::ZERO, 1)
            .expect("valid frame");
        assert!(!m.in_tune);
    }

    #[test]
    fn invalid_frames_are_rejected_without_touching_history() {
        let mut analyzer = MetricsAnalyzer::default();

        let empty = AudioFrame::new(vec![], vec![], SR, 0);
        assert_eq!(
            analyzer.analyze(&empty, None, Duration::ZERO, 0),
            Err(AnalysisFrameError::EmptySpectrum)
        );

        let no_rate = AudioFrame::new(vec![-10.0; 8], vec![], 0, 0);
        assert_eq!(
            analyzer.analyze(&no_rate, None, Duration::ZERO, 0),
            Err(AnalysisFrameError::InvalidSampleRate(0))
        );

        let nan = AudioFrame::new(vec![-10.0, f32::NAN], vec![], SR, 0);
        assert_eq!(
            analyzer.analyze(&nan, None, Duration::ZERO, 0),
            Err(AnalysisFrameError::NonFinite)
        );

        assert_eq!(analyzer.history_len(), 0);
    }

    #[test]
    fn negative_infinity_bins_are_valid_silence() {
        let mut analyzer = MetricsAnalyzer::default();
        let silent = AudioFrame::new(vec![f32::NEG_INFINITY; BINS], vec![], SR, 0);
        let m = analyzer
            .analyze(&silent, None, Duration::ZERO, 0)
            .expect("silence is valid");
        assert_eq!(m.pitch, 0.0);
        assert_eq!(m.volume, 0.0);
        assert_eq!(analyzer.history_len(), 1);
    }

    #[test]
    fn no_signal_keeps_stability() {
        let m = VocalMetrics::no_signal(42.0, Duration::from_secs(1), 7);
        assert_eq!(m.stability, 42.0);
        assert_eq!((m.pitch, m.volume, m.confidence), (0.0, 0.0, 0.0));
        assert!(!m.in_tune && !m.signal && !m.stalled);

        let s = VocalMetrics::stalled(42.0, Duration::from_secs(1), 7);
        assert!(s.stalled && !s.signal);
    }

    #[test]
    fn reset_clears_history() {
        let mut analyzer = MetricsAnalyzer::new(4);
        for seq in 0..6 {
            analyzer
                .analyze(&steady_a4(), None, Duration::ZERO, seq)
                .expect("valid");
        }
        assert_eq!(analyzer.history_len(), 4);
        analyzer.reset();
        assert_eq!(analyzer.history_len(), 0);
        assert_eq!(analyzer.stability(), 0.0);
    }
}
