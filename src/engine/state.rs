//! Engine lifecycle state.
//!
//! [`EngineState`] is published through a `tokio::sync::watch` channel so the
//! UI and the coaching sampler can follow start / stop transitions without
//! polling.

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

/// States of the metrics engine.
///
/// ```text
/// Idle ──start──▶ Running ──stop / stall timeout──▶ Idle
/// Idle ──start fails──▶ Error ──start──▶ Running
/// any state ──stop──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineState {
    /// Not analysing; no audio stream is held.
    #[default]
    Idle,

    /// The tick task is producing metrics.
    Running,

    /// The last `start` failed to acquire the microphone.  The engine is not
    /// running and `start` may be called again.
    Error,
}

impl EngineState {
    /// `true` while metrics are being produced.
    ///
    /// ```
    /// use vocal_coach::engine::EngineState;
    ///
    /// assert!(EngineState::Running.is_running());
    /// assert!(!EngineState::Idle.is_running());
    /// assert!(!EngineState::Error.is_running());
    /// ```
    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Running)
    }

    /// A short human-readable label for the status bar.
    pub fn label(&self) -> &'static str {
        match self {
            EngineState::Idle => "Idle",
            EngineState::Running => "Listening",
            EngineState::Error => "Microphone error",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
