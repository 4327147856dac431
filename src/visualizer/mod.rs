//! Live visualisation of the newest audio frame.
//!
//! The render loop reads [`VocalMetricsEngine::latest_frame`] and hands it to
//! [`render`] together with a [`Canvas`].  Frames are immutable `Arc`
//! snapshots, so a frame that has not changed since the last paint simply
//! draws the same picture again.
//!
//! [`VocalMetricsEngine::latest_frame`]: crate::engine::VocalMetricsEngine::latest_frame

use thiserror::Error;

pub mod canvas;
pub mod render;

pub use canvas::{Canvas, Point, Rgba};
pub use render::{render, render_inactive, VisualMode, VisualStyle, Visualizer};

/// Rejected visualizer settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisualizerError {
    #[error("invalid colour `{0}`, expected #rrggbb or #rrggbbaa")]
    InvalidColor(String),

    #[error("sensitivity must be a positive number, got {0}")]
    InvalidSensitivity(f32),

    #[error("height must be a positive number of pixels, got {0}")]
    InvalidHeight(f32),
}
