//! Real-time vocal analysis for karaoke.
//!
//! Microphone samples flow through a short-time spectrum into per-tick pitch,
//! volume and stability metrics.  The metrics drive a live visualizer and a
//! throttled coaching loop that turns them into singing tips.

pub mod analysis;
pub mod app;
pub mod audio;
pub mod coaching;
pub mod config;
pub mod engine;
pub mod visualizer;
