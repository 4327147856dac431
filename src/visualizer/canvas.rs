//! Drawing surface abstraction and colours.
//!
//! The visualizer only needs five primitives, so any immediate-mode painter
//! can host it.  The demo app implements [`Canvas`] on an `egui::Painter`.

use std::str::FromStr;

use super::VisualizerError;

// ---------------------------------------------------------------------------
// Rgba
// ---------------------------------------------------------------------------

/// Straight (non-premultiplied) 8-bit colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same colour with alpha replaced.
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Same colour with alpha multiplied by `factor` (clamped to `0..=1`).
    pub fn fade(self, factor: f32) -> Self {
        let a = (self.a as f32 * factor.clamp(0.0, 1.0)).round() as u8;
        self.with_alpha(a)
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (the `#` is required).
    ///
    /// ```rust
    /// use vocal_coach::visualizer::Rgba;
    ///
    /// assert_eq!(Rgba::parse("#8b5cf6").unwrap(), Rgba::new(0x8b, 0x5c, 0xf6, 0xff));
    /// assert_eq!(Rgba::parse("#8b5cf640").unwrap().a, 0x40);
    /// assert!(Rgba::parse("violet").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, VisualizerError> {
        let invalid = || VisualizerError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if hex.len() == 8 { channel(6)? } else { 0xff },
        })
    }
}

impl FromStr for Rgba {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// A point in surface pixels, origin top-left, y pointing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The caller-supplied drawing surface.
pub trait Canvas {
    /// `(width, height)` in pixels.
    fn size(&self) -> (f32, f32);

    /// Cover the whole surface with a translucent colour.
    fn fade(&mut self, color: Rgba);

    /// Rectangle filled with a vertical gradient from `top` to `bottom`.
    fn fill_rect_gradient(&mut self, x: f32, y: f32, width: f32, height: f32, top: Rgba, bottom: Rgba);

    /// Connected line through `points`.
    fn stroke_polyline(&mut self, points: &[Point], width: f32, color: Rgba);

    /// Single line segment.
    fn stroke_line(&mut self, from: Point, to: Point, width: f32, color: Rgba);
}

// ---------------------------------------------------------------------------
// RecordingCanvas (tests only)
// ---------------------------------------------------------------------------

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Fade(Rgba),
    Rect { x: f32, y: f32, width: f32, height: f32, top: Rgba, bottom: Rgba },
    Polyline { points: Vec<Point>, width: f32, color: Rgba },
    Line { from: Point, to: Point, width: f32, color: Rgba },
}

/// Canvas that records every call for inspection.
#[cfg(test)]
pub struct RecordingCanvas {
    pub width: f32,
    pub height: f32,
    pub commands: Vec<DrawCommand>,
}

#[cfg(test)]
impl RecordingCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Canvas for RecordingCanvas {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn fade(&mut self, color: Rgba) {
        self.commands.push(DrawCommand::Fade(color));
    }

    fn fill_rect_gradient(&mut self, x: f32, y: f32, width: f32, height: f32, top: Rgba, bottom: Rgba) {
        self.commands.push(DrawCommand::Rect { x, y, width, height, top, bottom });
    }

    fn stroke_polyline(&mut self, points: &[Point], width: f32, color: Rgba) {
        self.commands.push(DrawCommand::Polyline {
            points: points.to_vec(),
            width,
            color,
        });
    }

    fn stroke_line(&mut self, from: Point, to: Point, width: f32, color: Rgba) {
        self.commands.push(DrawCommand::Line { from, to, width, color });
    }
}
