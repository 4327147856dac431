//! Real-time metrics engine.
//!
//! # Architecture
//!
//! ```text
//! AudioInput::open_stream()
//!        │
//!        ▼
//! VocalMetricsEngine::start()  ── opens FrequencyDomainSampler
//!        │
//!        ▼
//! tick task (tokio interval, ~16 ms)
//!        ├─ FrameSource::next_frame()     → latest_frame()  ← render loop
//!        ├─ MetricsAnalyzer::analyze()    → latest_metrics()
//!        └─ listeners (FIFO)              → UI, CoachingSampler
//!
//! watch_state()    ── Idle / Running / Error ──▶ CoachingSampler, UI
//! watch_sessions() ── bumped on every start   ──▶ CoachingSampler
//! ```

pub mod runner;
pub mod stall;
pub mod state;
pub mod subscribers;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::VocalMetricsEngine;
pub use stall::{StallDetector, StallStatus};
pub use state::EngineState;
pub use subscribers::{MetricsCallback, Subscription};
