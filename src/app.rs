//! Karaoke coach window (egui/eframe application).
//!
//! # Layout
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ ● Listening        [Start/Stop]  Mode ▾   │  title row
//! │ Key ▾  Transpose ───●───                  │  target controls
//! ├───────────────────────────────────────────┤
//! │ visualizer (bars / waveform / circular)   │
//! ├───────────────────────────────────────────┤
//! │ A4  +3 cents   in tune                    │  metrics panel
//! │ Volume ████░░  Stability ██████  Conf …   │
//! ├───────────────────────────────────────────┤
//! │ AI Vocal Coach   score 82 (A)  Improving  │  coaching panel
//! │ feedback / last three tips                │
//! └───────────────────────────────────────────┘
//! ```
//!
//! The app never blocks: the engine and coaching worker run on the tokio
//! runtime and the UI only reads their latest snapshots once per paint.

use std::sync::Arc;
use std::time::Duration;

use eframe::egui;

use crate::analysis::{note_name, PitchAccuracy, TargetPitch, VocalMetrics, MAX_TRANSPOSE};
use crate::audio::AudioInput;
use crate::coaching::{CoachingHandle, CoachingSampler, CoachingSnapshot, Trend};
use crate::config::AppConfig;
use crate::engine::{EngineState, VocalMetricsEngine};
use crate::visualizer::{Canvas, Point, Rgba, Visualizer};

/// Keys offered in the target selector; `None` means no target.
pub const KEYS: [&str; 12] = ["C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];

/// Tips shown at once, newest last.
const VISIBLE_TIPS: usize = 3;

// ---------------------------------------------------------------------------
// EguiCanvas
// ---------------------------------------------------------------------------

/// [`Canvas`] over a rectangle of an egui [`Painter`](egui::Painter).
pub struct EguiCanvas<'a> {
    painter: &'a egui::Painter,
    rect: egui::Rect,
}

impl<'a> EguiCanvas<'a> {
    pub fn new(painter: &'a egui::Painter, rect: egui::Rect) -> Self {
        Self { painter, rect }
    }

    fn pos(&self, x: f32, y: f32) -> egui::Pos2 {
        self.rect.min + egui::vec2(x, y)
    }
}

fn color32(c: Rgba) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(c.r, c.g, c.b, c.a)
}

impl Canvas for EguiCanvas<'_> {
    fn size(&self) -> (f32, f32) {
        (self.rect.width(), self.rect.height())
    }

    fn fade(&mut self, color: Rgba) {
        self.painter.rect_filled(self.rect, 0.0, color32(color));
    }

    fn fill_rect_gradient(&mut self, x: f32, y: f32, width: f32, height: f32, top: Rgba, bottom: Rgba) {
        let r = egui::Rect::from_min_size(self.pos(x, y), egui::vec2(width, height));
        let (top, bottom) = (color32(top), color32(bottom));
        let mut mesh = egui::Mesh::default();
        mesh.colored_vertex(r.left_top(), top);
        mesh.colored_vertex(r.right_top(), top);
        mesh.colored_vertex(r.right_bottom(), bottom);
        mesh.colored_vertex(r.left_bottom(), bottom);
        mesh.add_triangle(0, 1, 2);
        mesh.add_triangle(0, 2, 3);
        self.painter.add(egui::Shape::mesh(mesh));
    }

    fn stroke_polyline(&mut self, points: &[Point], width: f32, color: Rgba) {
        let points: Vec<egui::Pos2> = points.iter().map(|p| self.pos(p.x, p.y)).collect();
        self.painter
            .add(egui::Shape::line(points, egui::Stroke::new(width, color32(color))));
    }

    fn stroke_line(&mut self, from: Point, to: Point, width: f32, color: Rgba) {
        self.painter.line_segment(
            [self.pos(from.x, from.y), self.pos(to.x, to.y)],
            egui::Stroke::new(width, color32(color)),
        );
    }
}

// ---------------------------------------------------------------------------
// VocalCoachApp
// ---------------------------------------------------------------------------

/// eframe application: microphone toggle, visualizer, metrics and tips.
pub struct VocalCoachApp {
    runtime: tokio::runtime::Handle,
    input: Box<dyn AudioInput>,
    engine: VocalMetricsEngine,
    coaching: Arc<CoachingSampler>,
    /// Keeps the coaching worker subscribed; `None` if attaching failed.
    _coaching_handle: Option<CoachingHandle>,
    visualizer: Visualizer,
    /// Application configuration; UI choices are written back on exit.
    config: AppConfig,
}

impl VocalCoachApp {
    /// * `runtime`: the runtime the engine and coaching worker run on.
    /// * `input`: microphone provider, asked for a stream on every start.
    pub fn new(
        runtime: tokio::runtime::Handle,
        input: Box<dyn AudioInput>,
        engine: VocalMetricsEngine,
        coaching: Arc<CoachingSampler>,
        config: AppConfig,
    ) -> Self {
        let visualizer = Visualizer::from_config(&config.visualizer).unwrap_or_else(|e| {
            log::warn!("Invalid visualizer settings ({e}); using defaults");
            Visualizer {
                mode: config.visualizer.mode,
                ..Visualizer::default()
            }
        });

        let coaching_handle = {
            let _guard = runtime.enter();
            match coaching.attach(&engine) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("Coaching disabled: {e}");
                    None
                }
            }
        };

        let app = Self {
            runtime,
            input,
            engine,
            coaching,
            _coaching_handle: coaching_handle,
            visualizer,
            config,
        };
        app.apply_target();
        app
    }

    fn target(&self) -> Option<TargetPitch> {
        let key = self.config.ui.target_key.as_deref()?;
        TargetPitch::from_key(key, self.config.ui.transpose)
    }

    fn apply_target(&self) {
        let target = self.target();
        self.engine.set_target_pitch(target);
        self.coaching.set_target_pitch(target);
    }

    fn toggle_listening(&mut self) {
        if self.engine.is_running() {
            self.engine.stop();
            return;
        }
        let _guard = self.runtime.enter();
        if let Err(e) = self.engine.start_input(self.input.as_ref(), self.target()) {
            log::warn!("Could not start listening: {e}");
        }
    }

    // ── Panels ───────────────────────────────────────────────────────────

    fn draw_title_row(&mut self, ui: &mut egui::Ui) {
        let state = self.engine.state();
        ui.horizontal(|ui| {
            let (label, color) = state_label(state, self.engine.is_stalled());
            ui.label(egui::RichText::new("●").color(color));
            ui.label(egui::RichText::new(label).strong());

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                egui::ComboBox::from_id_salt("visual-mode")
                    .selected_text(self.visualizer.mode.label())
                    .show_ui(ui, |ui| {
                        for mode in crate::visualizer::VisualMode::ALL {
                            ui.selectable_value(&mut self.visualizer.mode, mode, mode.label());
                        }
                    });

                let button = if state.is_running() { "Stop" } else { "Start singing" };
                if ui.button(button).clicked() {
                    self.toggle_listening();
                }
            });
        });

        if state == EngineState::Error {
            let message = self
                .engine
                .last_error()
                .unwrap_or_else(|| "Microphone unavailable".into());
            ui.label(egui::RichText::new(message).color(egui::Color32::from_rgb(255, 136, 68)));
        }
    }

    fn draw_target_controls(&mut self, ui: &mut egui::Ui) {
        let mut changed = false;
        ui.horizontal(|ui| {
            let selected = self.config.ui.target_key.clone().unwrap_or_else(|| "Off".into());
            egui::ComboBox::from_label("Key")
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    changed |= ui
                        .selectable_value(&mut self.config.ui.target_key, None, "Off")
                        .changed();
                    for key in KEYS {
                        changed |= ui
                            .selectable_value(&mut self.config.ui.target_key, Some(key.to_string()), key)
                            .changed();
                    }
                });

            changed |= ui
                .add(
                    egui::Slider::new(&mut self.config.ui.transpose, -MAX_TRANSPOSE..=MAX_TRANSPOSE)
                        .text("Transpose"),
                )
                .changed();

            if let Some(target) = self.target() {
                ui.label(format!(
                    "{} ({:.0} Hz)",
                    note_name(target.cents()).unwrap_or_default(),
                    target.hz()
                ));
            }
        });
        if changed {
            self.apply_target();
        }
    }

    fn draw_visualizer(&self, ui: &mut egui::Ui) {
        let height = self.visualizer.style.height();
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(ui.available_width(), height), egui::Sense::hover());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 4.0, egui::Color32::from_rgb(17, 17, 27));

        let frame = self.engine.latest_frame();
        let active = self.engine.is_running() && !self.engine.is_stalled();
        let mut canvas = EguiCanvas::new(&painter, rect);
        self.visualizer.draw(&mut canvas, frame.as_deref(), active);
    }

    fn draw_metrics(&self, ui: &mut egui::Ui) {
        let Some(m) = self.engine.latest_metrics() else {
            ui.label(egui::RichText::new("Press start and sing").color(egui::Color32::GRAY));
            return;
        };

        let accuracy = PitchAccuracy::classify(m.pitch, self.engine.target_pitch());
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(pitch_text(&m, self.config.ui.show_note_names)).size(22.0).strong());
            if m.signal {
                let verdict = match accuracy {
                    PitchAccuracy::NoTarget => "",
                    _ if m.in_tune => "in tune",
                    _ => "off target",
                };
                ui.label(egui::RichText::new(verdict).color(accuracy_color(accuracy)));
            }
        });

        for (label, value) in [
            ("Volume", m.volume),
            ("Stability", m.stability),
            ("Confidence", m.confidence),
        ] {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(label).size(11.0));
                ui.add(
                    egui::ProgressBar::new((value / 100.0) as f32)
                        .text(format!("{value:.0}%"))
                        .desired_height(10.0),
                );
            });
        }
    }

    fn draw_coaching(&self, ui: &mut egui::Ui) {
        let CoachingSnapshot {
            tips,
            analysis,
            trend,
        } = self.coaching.snapshot();

        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("AI Vocal Coach").strong());
            if let Some(a) = &analysis {
                ui.label(format!("score {} ({})", a.score, a.grade()));
            }
            if let Some(t) = trend {
                ui.label(egui::RichText::new(t.label()).color(trend_color(t)));
            }
        });

        if let Some(a) = &analysis {
            if !a.feedback.is_empty() {
                ui.label(egui::RichText::new(&a.feedback).italics());
            }
        }

        if tips.is_empty() && analysis.is_none() {
            let hint = if self.engine.is_running() {
                "Listening… tips appear every few seconds"
            } else {
                "Start singing to get real-time coaching"
            };
            ui.label(egui::RichText::new(hint).color(egui::Color32::GRAY).size(11.0));
            return;
        }

        let skip = tips.len().saturating_sub(VISIBLE_TIPS);
        for tip in tips.iter().skip(skip) {
            ui.label(format!("• {}", tip.text));
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn state_label(state: EngineState, stalled: bool) -> (&'static str, egui::Color32) {
    match state {
        EngineState::Running if stalled => ("Microphone stalled", egui::Color32::from_rgb(255, 200, 68)),
        EngineState::Running => (state.label(), egui::Color32::from_rgb(80, 200, 120)),
        EngineState::Idle => (state.label(), egui::Color32::from_rgb(120, 120, 120)),
        EngineState::Error => (state.label(), egui::Color32::from_rgb(255, 136, 68)),
    }
}

/// `"A4 +3¢"`, `"+3¢"` without note names, `"--"` without a voice.
fn pitch_text(m: &VocalMetrics, show_note_names: bool) -> String {
    if !m.signal || (m.pitch == 0.0 && m.volume == 0.0) {
        return "--".into();
    }
    let cents = format!("{:+.0}¢", m.pitch);
    match note_name(m.pitch) {
        Some(note) if show_note_names => format!("{note} {cents}"),
        _ => cents,
    }
}

fn accuracy_color(accuracy: PitchAccuracy) -> egui::Color32 {
    match accuracy {
        PitchAccuracy::Good => egui::Color32::from_rgb(80, 200, 120),
        PitchAccuracy::Close => egui::Color32::from_rgb(255, 200, 68),
        PitchAccuracy::Off => egui::Color32::from_rgb(255, 80, 80),
        PitchAccuracy::NoTarget => egui::Color32::GRAY,
    }
}

fn trend_color(trend: Trend) -> egui::Color32 {
    match trend {
        Trend::Improving => egui::Color32::from_rgb(80, 200, 120),
        Trend::Stable => egui::Color32::from_rgb(68, 136, 255),
        Trend::Declining => egui::Color32::from_rgb(255, 136, 68),
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for VocalCoachApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ~60 fps while listening; slower otherwise so the delayed tip clear
        // still shows up.
        let repaint = if self.engine.is_running() { 16 } else { 250 };
        ctx.request_repaint_after(Duration::from_millis(repaint));

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_title_row(ui);
            self.draw_target_controls(ui);
            ui.separator();
            self.draw_visualizer(ui);
            ui.separator();
            self.draw_metrics(ui);
            ui.separator();
            self.draw_coaching(ui);
        });
    }

    /// Stop the microphone and persist the UI choices (best-effort).
    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.engine.stop();
        self.config.visualizer.mode = self.visualizer.mode;
        if let Err(e) = self.config.save() {
            log::warn!("Failed to save settings: {e}");
        }
        log::info!("Vocal coach closing");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced(pitch: f64) -> VocalMetrics {
        VocalMetrics {
            pitch,
            volume: 40.0,
            stability: 90.0,
            in_tune: true,
            confidence: 65.0,
            timestamp: Duration::from_secs(1),
            sequence: 60,
            stalled: false,
            signal: true,
        }
    }

    #[test]
    fn every_offered_key_is_a_valid_target() {
        for key in KEYS {
            assert!(TargetPitch::from_key(key, 0).is_some(), "{key}");
        }
    }

    #[test]
    fn pitch_text_formats() {
        assert_eq!(pitch_text(&voiced(3.0), true), "A4 +3¢");
        assert_eq!(pitch_text(&voiced(-900.0), false), "-900¢");
        let silent = VocalMetrics::no_signal(0.0, Duration::ZERO, 0);
        assert_eq!(pitch_text(&silent, true), "--");
    }

    #[test]
    fn stalled_running_engine_is_flagged() {
        assert_eq!(state_label(EngineState::Running, true).0, "Microphone stalled");
        assert_eq!(state_label(EngineState::Running, false).0, "Listening");
        assert_eq!(state_label(EngineState::Error, false).0, "Microphone error");
    }
}
