//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the engine,
//! visualizer and coaching sampler by value.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::visualizer::VisualMode;

// ---------------------------------------------------------------------------
// SamplerConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture and the spectrum sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Transform size in samples.  Power of two in `32..=32768`; the
    /// spectrum has `fft_size / 2` bins.
    pub fft_size: usize,
    /// Exponential smoothing between consecutive spectra (`0.0..=1.0`).
    /// `0.0` disables smoothing.
    pub smoothing_time_constant: f32,
    /// dB value drawn as an empty bar.
    pub min_decibels: f32,
    /// dB value drawn as a full bar.
    pub max_decibels: f32,
    /// Audio input device name, `None` means the system default.
    pub audio_device: Option<String>,
    /// Mono samples retained by the shared capture buffer.
    pub buffer_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            audio_device: None,
            buffer_capacity: 16_384,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Settings for the metrics tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period of the metrics tick in milliseconds (~60 Hz by default).
    pub tick_interval_ms: u64,
    /// Number of pitch samples the stability score is computed over.
    pub history_size: usize,
    /// How long the source may deliver no new samples before snapshots are
    /// flagged as stalled.
    pub stall_grace_ms: u64,
    /// How long a stall may last before the engine stops itself.
    /// `0` keeps the engine running indefinitely.
    pub stall_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            history_size: 10,
            stall_grace_ms: 1_000,
            stall_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// VisualizerConfig
// ---------------------------------------------------------------------------

/// Appearance of the live visualizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Initial drawing mode.
    pub mode: VisualMode,
    /// Stroke / fill colour as `#rrggbb` or `#rrggbbaa`.
    pub color: String,
    /// Amplitude multiplier, must be positive.
    pub sensitivity: f32,
    /// Drawing surface height in pixels.
    pub height: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            mode: VisualMode::default(),
            color: "#8b5cf6".into(),
            sensitivity: 1.0,
            height: 100.0,
        }
    }
}

// ---------------------------------------------------------------------------
// CoachingConfig
// ---------------------------------------------------------------------------

/// Settings for the real-time coaching loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    /// Whether metrics are forwarded to the advisor at all.
    pub enabled: bool,
    /// Minimum milliseconds between two accepted metrics samples.
    pub interval_ms: u64,
    /// Tips kept on screen; the oldest is evicted beyond this.
    pub max_tips: usize,
    /// Tips taken from a single advisor reply.
    pub tips_per_analysis: usize,
    /// Accepted samples sent along as history.
    pub history_size: usize,
    /// Seconds after the engine stops before tips are cleared.
    pub clear_after_secs: u64,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2_000,
            max_tips: 5,
            tips_per_analysis: 2,
            history_size: 5,
            clear_after_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// AdvisorProvider / AdvisorConfig
// ---------------------------------------------------------------------------

/// Selects which backend generates coaching tips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum AdvisorProvider {
    /// Offline heuristics only, no network.
    #[default]
    RuleBased,
    /// Any OpenAI-compatible chat-completions API, falling back to the
    /// heuristics when a request fails.
    OpenAiCompatible,
}

/// Settings for the tip-generating backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Which backend to use.
    pub provider: AdvisorProvider,
    /// Base URL of the API endpoint (e.g. `https://api.openai.com`).
    pub base_url: String,
    /// API key, `None` for local servers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API.
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Maximum seconds to wait for a reply.
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            provider: AdvisorProvider::default(),
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Demo window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Last saved window position `(x, y)`.  `None` lets the window manager
    /// choose.
    pub window_position: Option<(f32, f32)>,
    /// Keep the window above all others.
    pub always_on_top: bool,
    /// Key of the song being sung (`"C"`, `"F#"`, `"Bb"` ...), `None` for no
    /// target pitch.
    pub target_key: Option<String>,
    /// Transpose in semitones, clamped to `-12..=12`.
    pub transpose: i32,
    /// Show the nearest note name next to the pitch readout.
    pub show_note_names: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_position: None,
            always_on_top: false,
            target_key: Some("A".into()),
            transpose: 0,
            show_note_names: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use vocal_coach::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture and spectrum settings.
    pub sampler: SamplerConfig,
    /// Metrics tick settings.
    pub engine: EngineConfig,
    /// Visualizer appearance.
    pub visualizer: VisualizerConfig,
    /// Coaching loop settings.
    pub coaching: CoachingConfig,
    /// Tip backend settings.
    pub advisor: AdvisorConfig,
    /// Demo window settings.
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.sampler.fft_size, 256);
        assert_eq!(cfg.sampler.smoothing_time_constant, 0.8);
        assert_eq!(cfg.sampler.min_decibels, -100.0);
        assert_eq!(cfg.sampler.max_decibels, -30.0);
        assert_eq!(cfg.engine.tick_interval_ms, 16);
        assert_eq!(cfg.engine.history_size, 10);
        assert_eq!(cfg.engine.stall_grace_ms, 1_000);
        assert_eq!(cfg.engine.stall_timeout_secs, 30);
        assert_eq!(cfg.visualizer.mode, VisualMode::Bars);
        assert_eq!(cfg.visualizer.color, "#8b5cf6");
        assert_eq!(cfg.visualizer.sensitivity, 1.0);
        assert_eq!(cfg.visualizer.height, 100.0);
        assert_eq!(cfg.coaching.interval_ms, 2_000);
        assert_eq!(cfg.coaching.max_tips, 5);
        assert_eq!(cfg.coaching.tips_per_analysis, 2);
        assert_eq!(cfg.coaching.clear_after_secs, 10);
        assert_eq!(cfg.advisor.provider, AdvisorProvider::RuleBased);
        assert!(cfg.advisor.api_key.is_none());
        assert_eq!(cfg.ui.target_key.as_deref(), Some("A"));
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.sampler.fft_size = 2048;
        cfg.sampler.audio_device = Some("USB Mic".into());
        cfg.engine.stall_timeout_secs = 0;
        cfg.visualizer.mode = VisualMode::Circular;
        cfg.visualizer.color = "#ff000080".into();
        cfg.advisor.provider = AdvisorProvider::OpenAiCompatible;
        cfg.advisor.api_key = Some("sk-test".into());
        cfg.ui.transpose = -3;
        cfg.ui.target_key = None;
        cfg.ui.window_position = Some((100.0, 200.0));

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded, cfg);
    }

    /// Older files that lack whole sections still load, filling the gaps
    /// with defaults.
    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[sampler]\nfft_size = 1024\n").expect("write");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded.sampler.fft_size, 1024);
        assert_eq!(loaded.sampler.smoothing_time_constant, 0.8);
        assert_eq!(loaded.engine, EngineConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "sampler = [").expect("write");

        assert!(AppConfig::load_from(&path).is_err());
    }
}
