//! Application entry point: karaoke vocal coach.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the coaching advisor selected by `advisor.provider`.
//! 5. Create the metrics engine, the coaching sampler and the cpal input.
//! 6. Run [`eframe::run_native`], which blocks the main thread until the
//!    window is closed.

use std::sync::Arc;

use eframe::egui;
use vocal_coach::{
    app::VocalCoachApp,
    audio::{input_device_names, CpalInput},
    coaching::{ApiAdvisor, CoachingAdvisor, CoachingSampler, FallbackAdvisor, RuleBasedAdvisor},
    config::{AdvisorProvider, AppConfig},
    engine::VocalMetricsEngine,
};

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let mut vp = egui::ViewportBuilder::default()
        .with_title("Vocal Coach")
        .with_inner_size([440.0, 560.0])
        .with_min_inner_size([360.0, 420.0]);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    if let Some((x, y)) = config.ui.window_position {
        vp = vp.with_position(egui::pos2(x, y));
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

fn build_advisor(config: &AppConfig) -> Arc<dyn CoachingAdvisor> {
    match config.advisor.provider {
        AdvisorProvider::RuleBased => {
            log::info!("Coaching with built-in tips");
            Arc::new(RuleBasedAdvisor::new())
        }
        AdvisorProvider::OpenAiCompatible => {
            log::info!(
                "Coaching with {} at {}",
                config.advisor.model,
                config.advisor.base_url
            );
            Arc::new(FallbackAdvisor::new(ApiAdvisor::from_config(&config.advisor)))
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> eframe::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Vocal coach starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (tick task + coaching worker + advisor requests)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // 4. Advisor
    let advisor = build_advisor(&config);

    // 5. Engine, coaching, microphone
    let engine = VocalMetricsEngine::new(config.engine.clone(), config.sampler.clone());
    let coaching = Arc::new(CoachingSampler::new(config.coaching.clone(), advisor));

    let devices = input_device_names();
    if devices.is_empty() {
        log::warn!("No input devices found");
    } else {
        log::info!("Input devices: {}", devices.join(", "));
    }
    let input = CpalInput::new(config.sampler.audio_device.clone(), config.sampler.buffer_capacity);

    // 6. Build the egui app and run it (blocks until the window is closed)
    let app = VocalCoachApp::new(
        rt.handle().clone(),
        Box::new(input),
        engine,
        coaching,
        config.clone(),
    );
    let options = native_options(&config);

    eframe::run_native(
        "Vocal Coach",
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
}
