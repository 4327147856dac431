//! Signal analysis: spectrum → pitch → stability → per-tick metrics.
//!
//! ```text
//! AudioFrame ─► PitchEstimator ─► StabilityTracker ─┐
//!      └──────► volume ─────────────────────────────┴─► VocalMetrics
//! ```
//!
//! Everything here is synchronous and allocation-light; the engine calls
//! [`MetricsAnalyzer::analyze`] once per tick.

pub mod metrics;
pub mod pitch;
pub mod stability;

pub use metrics::{
    confidence, is_in_tune, volume, AnalysisFrameError, MetricsAnalyzer, VocalMetrics,
    IN_TUNE_THRESHOLD_CENTS,
};
pub use pitch::{
    cents_to_hz, hz_to_cents, note_name, PitchAccuracy, PitchEstimator, PitchSample, TargetPitch,
    A4_HZ, MAX_TRANSPOSE, MAX_VOCAL_HZ, MIN_VOCAL_HZ,
};
pub use stability::{StabilityTracker, DEFAULT_HISTORY_SIZE};
