//! Throttled metrics → advisor → tips loop.
//!
//! # Data flow
//!
//! ```text
//! engine listener ──▶ CoachingSampler::offer()  (throttle, ≥ 2 s apart)
//!                          │ accepted
//!                          ▼
//!                    mpsc ──▶ worker ──▶ tokio::spawn(advisor.produce_tips())
//!                                              │
//!                                              ▼
//!                                   apply(): tips (≤ 5), analysis, trend
//!
//! engine.watch_sessions() ──▶ worker: new session → clear()
//! engine.watch_state()    ──▶ worker: left Running → clear() after 10 s
//!                                     unless a session starts first
//! ```
//!
//! Every [`clear`](CoachingSampler::clear) bumps a generation counter; replies
//! to requests issued before the clear are dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::analysis::{TargetPitch, VocalMetrics};
use crate::coaching::advisor::{Advice, CoachingAdvisor, CoachingRequest};
use crate::config::CoachingConfig;
use crate::engine::{EngineState, Subscription, VocalMetricsEngine};

/// A score must move by more than this to count as a trend.
pub const TREND_MARGIN: u8 = 5;

/// Accepted samples waiting for the worker; more are dropped.
const QUEUE_DEPTH: usize = 4;

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Accepts at most one event per interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// `true` for the first call and whenever `interval` has elapsed since the
    /// last accepted call.
    pub fn admit(&mut self, now: Instant) -> bool {
        let open = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if open {
            self.last = Some(now);
        }
        open
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ---------------------------------------------------------------------------
// Tips, analysis, trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingTip {
    pub text: String,
    /// Increases by one for every tip ever shown, across clears.
    pub sequence: u64,
}

/// The latest overall judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    /// `round((pitch + volume + stability) / 3)` clamped to `0..=100`.
    pub score: u8,
    pub feedback: String,
    /// Engine timestamp of the analysed sample.
    pub timestamp: Duration,
}

impl PerformanceAnalysis {
    pub fn grade(&self) -> &'static str {
        grade(self.score)
    }
}

/// Overall score of one sample.
///
/// Pitch is in cents relative to A4, so singing far below A4 drags the score
/// down and far above it saturates at 100.
pub fn performance_score(metrics: &VocalMetrics) -> u8 {
    let mean = (metrics.pitch + metrics.volume + metrics.stability) / 3.0;
    if !mean.is_finite() {
        return 0;
    }
    mean.round().clamp(0.0, 100.0) as u8
}

/// Letter grade for a `0..=100` score.
pub fn grade(score: u8) -> &'static str {
    match score {
        90.. => "A+",
        80..=89 => "A",
        70..=79 => "B",
        60..=69 => "C",
        _ => "D",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn between(previous: u8, current: u8) -> Self {
        if current > previous.saturating_add(TREND_MARGIN) {
            Self::Improving
        } else if current < previous.saturating_sub(TREND_MARGIN) {
            Self::Declining
        } else {
            Self::Stable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Improving => "Improving",
            Self::Stable => "Stable",
            Self::Declining => "Needs focus",
        }
    }
}

/// What the UI shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoachingSnapshot {
    /// Oldest first.
    pub tips: Vec<CoachingTip>,
    pub analysis: Option<PerformanceAnalysis>,
    pub trend: Option<Trend>,
}

// ---------------------------------------------------------------------------
// CoachingState
// ---------------------------------------------------------------------------

struct CoachingState {
    throttle: Throttle,
    history: VecDeque<VocalMetrics>,
    tips: VecDeque<CoachingTip>,
    analysis: Option<PerformanceAnalysis>,
    trend: Option<Trend>,
    target: Option<TargetPitch>,
    generation: u64,
    next_tip: u64,
    /// Sequence of the newest sample whose reply was applied.
    applied: Option<u64>,
}

/// A request that passed the throttle.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub request: CoachingRequest,
    generation: u64,
}

// ---------------------------------------------------------------------------
// CoachingSampler
// ---------------------------------------------------------------------------

/// Samples engine metrics, asks a [`CoachingAdvisor`] for tips and keeps a
/// bounded list of them.
///
/// All methods take `&self`; share the sampler as `Arc<CoachingSampler>`.
pub struct CoachingSampler {
    config: CoachingConfig,
    advisor: Arc<dyn CoachingAdvisor>,
    state: Mutex<CoachingState>,
}

impl CoachingSampler {
    pub fn new(config: CoachingConfig, advisor: Arc<dyn CoachingAdvisor>) -> Self {
        let state = CoachingState {
            throttle: Throttle::new(Duration::from_millis(config.interval_ms)),
            history: VecDeque::with_capacity(config.history_size),
            tips: VecDeque::with_capacity(config.max_tips),
            analysis: None,
            trend: None,
            target: None,
            generation: 0,
            next_tip: 0,
            applied: None,
        };
        Self {
            config,
            advisor,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &CoachingConfig {
        &self.config
    }

    /// Target note sent along with every request.
    pub fn set_target_pitch(&self, target: Option<TargetPitch>) {
        self.lock().target = target;
    }

    /// Run `metrics` through the throttle.
    ///
    /// Returns a ticket for the advisor when the sample is accepted.  The
    /// request carries the previously accepted samples as history; the
    /// accepted sample then joins the history.
    pub fn offer(&self, metrics: &VocalMetrics, now: Instant) -> Option<Ticket> {
        if !self.config.enabled {
            return None;
        }
        let mut state = self.lock();
        if !state.throttle.admit(now) {
            return None;
        }

        let request = CoachingRequest {
            metrics: *metrics,
            history: state.history.iter().copied().collect(),
            target: state.target,
        };

        if self.config.history_size > 0 {
            while state.history.len() >= self.config.history_size {
                state.history.pop_front();
            }
            state.history.push_back(*metrics);
        }

        Some(Ticket {
            request,
            generation: state.generation,
        })
    }

    /// Record an advisor reply.
    ///
    /// Returns `false` when the reply is stale: a clear happened since the
    /// ticket was issued, or a newer sample's reply was already applied.
    pub fn apply(&self, ticket: &Ticket, advice: Advice) -> bool {
        let mut state = self.lock();
        let metrics = &ticket.request.metrics;
        if ticket.generation != state.generation
            || state.applied.is_some_and(|seq| seq >= metrics.sequence)
        {
            return false;
        }
        state.applied = Some(metrics.sequence);

        let score = performance_score(metrics);
        state.trend = state.analysis.as_ref().map(|prev| Trend::between(prev.score, score));
        state.analysis = Some(PerformanceAnalysis {
            score,
            feedback: advice.feedback,
            timestamp: metrics.timestamp,
        });

        for text in advice.tips.into_iter().take(self.config.tips_per_analysis) {
            let sequence = state.next_tip;
            state.next_tip += 1;
            state.tips.push_back(CoachingTip { text, sequence });
        }
        while state.tips.len() > self.config.max_tips {
            state.tips.pop_front();
        }
        true
    }

    /// Offer, ask the advisor, apply.  Returns `true` if tips were updated.
    ///
    /// Advisor failures are logged and leave the tips unchanged.
    pub async fn sample(&self, metrics: &VocalMetrics) -> bool {
        match self.offer(metrics, Instant::now()) {
            Some(ticket) => self.consult(ticket).await,
            None => false,
        }
    }

    async fn consult(&self, ticket: Ticket) -> bool {
        match self.advisor.produce_tips(&ticket.request).await {
            Ok(advice) => self.apply(&ticket, advice),
            Err(err) => {
                log::warn!("coaching: advisor failed: {err}");
                false
            }
        }
    }

    /// Drop tips, analysis and history and reopen the throttle.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.throttle.reset();
        state.history.clear();
        state.tips.clear();
        state.analysis = None;
        state.trend = None;
        state.applied = None;
        state.generation += 1;
    }

    pub fn snapshot(&self) -> CoachingSnapshot {
        let state = self.lock();
        CoachingSnapshot {
            tips: state.tips.iter().cloned().collect(),
            analysis: state.analysis.clone(),
            trend: state.trend,
        }
    }

    pub fn tips(&self) -> Vec<CoachingTip> {
        self.lock().tips.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    fn lock(&self) -> MutexGuard<'_, CoachingState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // -----------------------------------------------------------------------
    // Engine attachment
    // -----------------------------------------------------------------------

    /// Follow `engine`: subscribe to its metrics and lifecycle and run the
    /// worker task on the current tokio runtime.
    ///
    /// Dropping the returned handle unsubscribes and stops the worker.
    pub fn attach(
        self: &Arc<Self>,
        engine: &VocalMetricsEngine,
    ) -> Result<CoachingHandle, tokio::runtime::TryCurrentError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

        let sampler = Arc::clone(self);
        let subscription = engine.subscribe(move |metrics: &VocalMetrics| {
            if let Some(ticket) = sampler.offer(metrics, Instant::now()) {
                if tx.try_send(ticket).is_err() {
                    log::debug!("coaching: queue full, dropping sample {}", metrics.sequence);
                }
            }
        });

        let task = runtime.spawn(run_worker(
            Arc::clone(self),
            rx,
            engine.watch_sessions(),
            engine.watch_state(),
        ));
        Ok(CoachingHandle {
            task,
            _subscription: subscription,
        })
    }
}

/// Keeps a [`CoachingSampler`] attached to an engine.
pub struct CoachingHandle {
    task: JoinHandle<()>,
    _subscription: Subscription,
}

impl CoachingHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CoachingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_worker(
    sampler: Arc<CoachingSampler>,
    mut tickets: mpsc::Receiver<Ticket>,
    mut sessions: watch::Receiver<u64>,
    mut states: watch::Receiver<EngineState>,
) {
    let clear_after = Duration::from_secs(sampler.config.clear_after_secs);
    let _ = sessions.borrow_and_update();
    let mut running = states.borrow_and_update().is_running();
    let mut clear_at: Option<Instant> = None;

    loop {
        tokio::select! {
            ticket = tickets.recv() => {
                let Some(ticket) = ticket else { break };
                let sampler = Arc::clone(&sampler);
                tokio::spawn(async move {
                    sampler.consult(ticket).await;
                });
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = *sessions.borrow_and_update();
                log::debug!("coaching: engine session {session} started, resetting tips");
                clear_at = None;
                sampler.clear();
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_running = states.borrow_and_update().is_running();
                if now_running {
                    clear_at = None;
                } else if running {
                    log::debug!("coaching: engine stopped, clearing tips in {clear_after:?}");
                    clear_at = Some(Instant::now() + clear_after);
                }
                running = now_running;
            }
            _ = tokio::time::sleep_until(clear_at.unwrap_or_else(Instant::now)), if clear_at.is_some() => {
                clear_at = None;
                sampler.clear();
            }
        }
    }
    log::debug!("coaching: worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
