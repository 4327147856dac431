//! Real-time coaching.
//!
//! This module provides:
//! * [`CoachingSampler`]: throttles engine metrics, keeps tips, analysis and trend.
//! * [`CoachingAdvisor`]: async trait implemented by every tip backend.
//! * [`ApiAdvisor`]: OpenAI-compatible chat-completions backend.
//! * [`RuleBasedAdvisor`]: offline heuristics.
//! * [`FallbackAdvisor`]: wraps any advisor; uses the heuristics on failure.
//! * [`CoachingPrompt`]: builds the chat prompt for [`ApiAdvisor`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vocal_coach::coaching::{CoachingSampler, RuleBasedAdvisor};
//! use vocal_coach::config::AppConfig;
//! use vocal_coach::engine::VocalMetricsEngine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let engine = VocalMetricsEngine::new(config.engine.clone(), config.sampler.clone());
//!     let sampler = Arc::new(CoachingSampler::new(
//!         config.coaching.clone(),
//!         Arc::new(RuleBasedAdvisor::new()),
//!     ));
//!     let _coaching = sampler.attach(&engine).unwrap();
//!     // engine.start(...); render sampler.snapshot() every frame
//! }
//! ```

pub mod advisor;
pub mod fallback;
pub mod prompt;
pub mod rules;
pub mod sampler;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use advisor::{parse_advice, Advice, AdvisorError, ApiAdvisor, CoachingAdvisor, CoachingRequest};
pub use fallback::FallbackAdvisor;
pub use prompt::CoachingPrompt;
pub use rules::RuleBasedAdvisor;
pub use sampler::{
    grade, performance_score, CoachingHandle, CoachingSampler, CoachingSnapshot, CoachingTip,
    PerformanceAnalysis, Throttle, Ticket, Trend,
};
