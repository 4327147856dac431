//! Bars / waveform / circular renderings of an [`AudioFrame`].
//!
//! Every render starts by fading the surface with `rgba(0, 0, 0, 0.1)`, so on
//! a retained surface older frames leave a short trail.
//!
//! | Mode       | Data            | Geometry                                              |
//! |------------|-----------------|-------------------------------------------------------|
//! | `Bars`     | byte spectrum   | width `w/bins·2.5`, step `+1`, height `b/255·h·sens`  |
//! | `Waveform` | time domain     | `y = h/2 − s·sens·h/2`, ends at `(w, h/2)`, 2 px      |
//! | `Circular` | byte spectrum   | ring `r = min(w,h)/4`, spokes of `b/255·r·sens`       |

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use super::canvas::{Canvas, Point, Rgba};
use super::VisualizerError;
use crate::audio::AudioFrame;
use crate::config::VisualizerConfig;

/// Per-render fade: black at 10 % opacity.
pub const FADE: Rgba = Rgba::new(0, 0, 0, 26);
/// Alpha at the bottom of each bar's gradient.
pub const BAR_GRADIENT_ALPHA: u8 = 0x40;
/// Stroke width of the waveform and the circular spokes.
pub const LINE_WIDTH: f32 = 2.0;
/// Opacity multiplier for the inactive baseline.
pub const INACTIVE_OPACITY: f32 = 0.5;

// ---------------------------------------------------------------------------
// VisualMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualMode {
    #[default]
    Bars,
    Waveform,
    Circular,
}

impl VisualMode {
    pub const ALL: [VisualMode; 3] = [VisualMode::Bars, VisualMode::Waveform, VisualMode::Circular];

    pub fn label(&self) -> &'static str {
        match self {
            VisualMode::Bars => "Bars",
            VisualMode::Waveform => "Waveform",
            VisualMode::Circular => "Circular",
        }
    }
}

// ---------------------------------------------------------------------------
// VisualStyle
// ---------------------------------------------------------------------------

/// Validated appearance settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualStyle {
    color: Rgba,
    sensitivity: f32,
    height: f32,
}

impl Default for VisualStyle {
    fn default() -> Self {
        Self {
            color: Rgba::new(0x8b, 0x5c, 0xf6, 0xff),
            sensitivity: 1.0,
            height: 100.0,
        }
    }
}

impl VisualStyle {
    /// # Errors
    ///
    /// [`VisualizerError`] for an unparsable colour or a non-positive
    /// (or non-finite) sensitivity or height.
    pub fn new(color: &str, sensitivity: f32, height: f32) -> Result<Self, VisualizerError> {
        let color = Rgba::parse(color)?;
        if !(sensitivity.is_finite() && sensitivity > 0.0) {
            return Err(VisualizerError::InvalidSensitivity(sensitivity));
        }
        if !(height.is_finite() && height > 0.0) {
            return Err(VisualizerError::InvalidHeight(height));
        }
        Ok(Self {
            color,
            sensitivity,
            height,
        })
    }

    pub fn from_config(config: &VisualizerConfig) -> Result<Self, VisualizerError> {
        Self::new(&config.color, config.sensitivity, config.height)
    }

    pub fn color(&self) -> Rgba {
        self.color
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Requested surface height in pixels.
    pub fn height(&self) -> f32 {
        self.height
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Draw `frame` in `mode`.  `None` draws the inactive baseline.
pub fn render(canvas: &mut dyn Canvas, frame: Option<&AudioFrame>, mode: VisualMode, style: &VisualStyle) {
    let Some(frame) = frame else {
        render_inactive(canvas, mode, style);
        return;
    };
    canvas.fade(FADE);
    match mode {
        VisualMode::Bars => draw_bars(canvas, &frame.byte_frequency(), style),
        VisualMode::Waveform => draw_waveform(canvas, &frame.time_domain, style.color, style.sensitivity),
        VisualMode::Circular => draw_circular(canvas, &frame.byte_frequency(), style),
    }
}

/// Flat, half-opacity placeholder shown while there is nothing live to draw.
pub fn render_inactive(canvas: &mut dyn Canvas, mode: VisualMode, style: &VisualStyle) {
    canvas.fade(FADE);
    let (w, h) = canvas.size();
    let color = style.color.fade(INACTIVE_OPACITY);
    match mode {
        VisualMode::Bars => {
            canvas.stroke_line(Point::new(0.0, h - 1.0), Point::new(w, h - 1.0), LINE_WIDTH, color);
        }
        VisualMode::Waveform => {
            canvas.stroke_line(Point::new(0.0, h / 2.0), Point::new(w, h / 2.0), LINE_WIDTH, color);
        }
        VisualMode::Circular => {
            let (cx, cy, r) = ring(w, h);
            let points: Vec<Point> = (0..=64)
                .map(|i| {
                    let angle = i as f32 / 64.0 * TAU;
                    Point::new(cx + angle.cos() * r, cy + angle.sin() * r)
                })
                .collect();
            canvas.stroke_polyline(&points, LINE_WIDTH, color);
        }
    }
}

fn draw_bars(canvas: &mut dyn Canvas, bytes: &[u8], style: &VisualStyle) {
    if bytes.is_empty() {
        return;
    }
    let (w, h) = canvas.size();
    let bar_width = w / bytes.len() as f32 * 2.5;
    let bottom = style.color.with_alpha(BAR_GRADIENT_ALPHA);
    let mut x = 0.0;
    for &b in bytes {
        if x >= w {
            break;
        }
        let bar_height = b as f32 / 255.0 * h * style.sensitivity;
        canvas.fill_rect_gradient(x, h - bar_height, bar_width, bar_height, style.color, bottom);
        x += bar_width + 1.0;
    }
}

fn draw_waveform(canvas: &mut dyn Canvas, samples: &[f32], color: Rgba, sensitivity: f32) {
    let (w, h) = canvas.size();
    let mid = h / 2.0;
    let slice = if samples.is_empty() { 0.0 } else { w / samples.len() as f32 };
    let mut points: Vec<Point> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| Point::new(i as f32 * slice, mid - s * sensitivity * mid))
        .collect();
    if points.is_empty() {
        points.push(Point::new(0.0, mid));
    }
    points.push(Point::new(w, mid));
    canvas.stroke_polyline(&points, LINE_WIDTH, color);
}

fn draw_circular(canvas: &mut dyn Canvas, bytes: &[u8], style: &VisualStyle) {
    let (w, h) = canvas.size();
    let (cx, cy, r) = ring(w, h);
    let n = bytes.len() as f32;
    for (i, &b) in bytes.iter().enumerate() {
        let angle = i as f32 / n * TAU;
        let amplitude = b as f32 / 255.0 * r * style.sensitivity;
        let (sin, cos) = angle.sin_cos();
        canvas.stroke_line(
            Point::new(cx + cos * r, cy + sin * r),
            Point::new(cx + cos * (r + amplitude), cy + sin * (r + amplitude)),
            LINE_WIDTH,
            style.color,
        );
    }
}

/// Centre and radius of the circular view.
fn ring(w: f32, h: f32) -> (f32, f32, f32) {
    (w / 2.0, h / 2.0, w.min(h) / 4.0)
}

// ---------------------------------------------------------------------------
// Visualizer
// ---------------------------------------------------------------------------

/// Mode and style bundled for a render loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Visualizer {
    pub mode: VisualMode,
    pub style: VisualStyle,
}

impl Visualizer {
    pub fn new(mode: VisualMode, style: VisualStyle) -> Self {
        Self { mode, style }
    }

    pub fn from_config(config: &VisualizerConfig) -> Result<Self, VisualizerError> {
        Ok(Self::new(config.mode, VisualStyle::from_config(config)?))
    }

    /// Draw `frame` when `active`, otherwise the inactive baseline.
    pub fn draw(&self, canvas: &mut dyn Canvas, frame: Option<&AudioFrame>, active: bool) {
        render(canvas, frame.filter(|_| active), self.mode, &self.style);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
