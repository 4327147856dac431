//! The metrics engine: a periodic tokio task that pulls one frame per tick,
//! analyses it and notifies every listener.
//!
//! # Tick flow
//!
//! ```text
//! interval.tick()
//!   └─▶ take tick gate (session id must still match)
//!         ├─ source.next_frame()
//!         │    ├─ Err            → warn, no-signal snapshot
//!         │    └─ Ok(frame)      → stall check
//!         │          ├─ flowing  → MetricsAnalyzer::analyze
//!         │          │               └─ Err → warn, no-signal snapshot
//!         │          ├─ stalled  → stalled snapshot
//!         │          └─ timeout  → close source, Idle, task ends
//!         ├─ publish latest frame / metrics
//!         └─ notify listeners (FIFO)
//! ```
//!
//! [`VocalMetricsEngine::stop`] takes the same gate, so once it returns no
//! tick is in flight and none will run for the stopped session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::analysis::{MetricsAnalyzer, TargetPitch, VocalMetrics};
use crate::audio::{
    AudioFrame, AudioInitError, AudioInput, AudioStream, FrameSource, FrequencyDomainSampler,
};
use crate::config::{EngineConfig, SamplerConfig};

use super::stall::{StallDetector, StallStatus};
use super::state::EngineState;
use super::subscribers::{MetricsCallback, SubscriberList, Subscription};

// ---------------------------------------------------------------------------
// Session (guarded by the tick gate)
// ---------------------------------------------------------------------------

/// Everything one start → stop cycle owns.
struct Session {
    /// Bumped by every start and stop; a tick task only runs while its own
    /// id is current.
    id: u64,
    source: Option<Box<dyn FrameSource>>,
    analyzer: MetricsAnalyzer,
    stall: StallDetector,
    started_at: Instant,
    ticks: u64,
    /// Consecutive ticks that ended in a substituted snapshot.
    failures: u64,
}

impl Session {
    fn idle() -> Self {
        Self {
            id: 0,
            source: None,
            analyzer: MetricsAnalyzer::default(),
            stall: StallDetector::new(Duration::ZERO, None),
            started_at: Instant::now(),
            ticks: 0,
            failures: 0,
        }
    }

    /// Invalidate the running session and release its source.
    fn end(&mut self) {
        self.id = self.id.wrapping_add(1);
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }
}

enum TickOutcome {
    Continue,
    Finished,
}

// ---------------------------------------------------------------------------
// Inner (shared with the tick task)
// ---------------------------------------------------------------------------

struct Inner {
    gate: Mutex<Session>,
    task: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<EngineState>,
    /// Id of the newest started session; bumped by every successful start.
    sessions: watch::Sender<u64>,
    subscribers: Arc<SubscriberList>,
    target: Mutex<Option<TargetPitch>>,
    latest_frame: Mutex<Option<Arc<AudioFrame>>>,
    latest_metrics: Mutex<Option<VocalMetrics>>,
    last_error: Mutex<Option<String>>,
    stalled: AtomicBool,
}

impl Inner {
    fn set_state(&self, next: EngineState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            log::debug!("engine: → {next:?}");
        }
    }

    fn tick(&self, session_id: u64) -> TickOutcome {
        let mut session = lock(&self.gate);
        if session.id != session_id {
            return TickOutcome::Finished;
        }

        let now = Instant::now();
        let timestamp = now.saturating_duration_since(session.started_at);
        let sequence = session.ticks;
        session.ticks += 1;
        let target = *lock(&self.target);

        let Some(source) = session.source.as_mut() else {
            return TickOutcome::Finished;
        };

        let metrics = match source.next_frame() {
            Err(e) => {
                Self::note_failure(&mut session, &e.to_string());
                VocalMetrics::no_signal(session.analyzer.stability(), timestamp, sequence)
            }
            Ok(frame) => {
                let frame = Arc::new(frame);
                *lock(&self.latest_frame) = Some(Arc::clone(&frame));

                match session.stall.observe(frame.sequence, now) {
                    StallStatus::TimedOut => {
                        log::warn!("engine: audio stream stalled past the timeout, stopping");
                        session.end();
                        drop(session);
                        self.stalled.store(false, Ordering::SeqCst);
                        self.set_state(EngineState::Idle);
                        return TickOutcome::Finished;
                    }
                    StallStatus::Stalled(idle) => {
                        if !self.stalled.swap(true, Ordering::SeqCst) {
                            log::warn!("engine: no new audio for {} ms", idle.as_millis());
                        }
                        VocalMetrics::stalled(session.analyzer.stability(), timestamp, sequence)
                    }
                    StallStatus::Flowing => {
                        if self.stalled.swap(false, Ordering::SeqCst) {
                            log::info!("engine: audio stream resumed");
                        }
                        match session.analyzer.analyze(&frame, target, timestamp, sequence) {
                            Ok(metrics) => {
                                session.failures = 0;
                                metrics
                            }
                            Err(e) => {
                                Self::note_failure(&mut session, &e.to_string());
                                VocalMetrics::no_signal(
                                    session.analyzer.stability(),
                                    timestamp,
                                    sequence,
                                )
                            }
                        }
                    }
                }
            }
        };

        *lock(&self.latest_metrics) = Some(metrics);
        self.subscribers.notify(&metrics);
        TickOutcome::Continue
    }

    /// Log the first failure of a run loudly and repeats quietly.
    fn note_failure(session: &mut Session, message: &str) {
        if session.failures == 0 {
            log::warn!("engine: frame skipped: {message}");
        } else {
            log::debug!("engine: frame skipped: {message}");
        }
        session.failures += 1;
    }
}

// ---------------------------------------------------------------------------
// VocalMetricsEngine
// ---------------------------------------------------------------------------

/// Real-time vocal metrics producer.
///
/// Create one per application, share it behind an `Arc`, and call
/// [`start`](Self::start) / [`stop`](Self::stop) as the user toggles the
/// microphone.  All methods take `&self`.
///
/// Listeners registered with [`subscribe`](Self::subscribe) run on the tick
/// task while the tick gate is held.  They must return quickly and must not
/// call [`stop`](Self::stop) (doing so deadlocks); hand work off to a
/// channel instead.
///
/// ```rust,no_run
/// use vocal_coach::audio::{AudioInput, CpalInput};
/// use vocal_coach::analysis::TargetPitch;
/// use vocal_coach::engine::VocalMetricsEngine;
///
/// # async fn example() {
/// let engine = VocalMetricsEngine::default();
/// let _sub = engine.subscribe(|m| println!("{:.0} cents, {:.0}% confident", m.pitch, m.confidence));
///
/// let stream = CpalInput::new(None, 16_384).open_stream().unwrap();
/// engine.start(stream, Some(TargetPitch::from_cents(0.0))).unwrap();
/// tokio::time::sleep(std::time::Duration::from_secs(5)).await;
/// engine.stop();
/// # }
/// ```
pub struct VocalMetricsEngine {
    config: EngineConfig,
    sampler_config: SamplerConfig,
    inner: Arc<Inner>,
}

impl Default for VocalMetricsEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default(), SamplerConfig::default())
    }
}

impl VocalMetricsEngine {
    pub fn new(config: EngineConfig, sampler_config: SamplerConfig) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        let (sessions, _) = watch::channel(0);
        Self {
            config,
            sampler_config,
            inner: Arc::new(Inner {
                gate: Mutex::new(Session::idle()),
                task: Mutex::new(None),
                state,
                sessions,
                subscribers: Arc::new(SubscriberList::default()),
                target: Mutex::new(None),
                latest_frame: Mutex::new(None),
                latest_metrics: Mutex::new(None),
                last_error: Mutex::new(None),
                stalled: AtomicBool::new(false),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open a [`FrequencyDomainSampler`] on `stream` and start ticking.
    ///
    /// Must be called from within a tokio runtime.  A running session is
    /// stopped first.
    ///
    /// # Errors
    ///
    /// Any [`AudioInitError`] from opening the sampler or spawning the tick
    /// task.  The engine is then in [`EngineState::Error`].
    pub fn start(
        &self,
        stream: Box<dyn AudioStream>,
        target: Option<TargetPitch>,
    ) -> Result<(), AudioInitError> {
        match FrequencyDomainSampler::open(stream, &self.sampler_config) {
            Ok(sampler) => self.start_with_source(Box::new(sampler), target),
            Err(e) => {
                self.stop();
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Ask `input` for a microphone stream and [`start`](Self::start) on it.
    ///
    /// A denied or missing microphone leaves the engine in
    /// [`EngineState::Error`] with the message in [`last_error`](Self::last_error).
    pub fn start_input(
        &self,
        input: &dyn AudioInput,
        target: Option<TargetPitch>,
    ) -> Result<(), AudioInitError> {
        match input.open_stream() {
            Ok(stream) => self.start(stream, target),
            Err(e) => {
                self.stop();
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Start ticking over any [`FrameSource`].
    ///
    /// # Errors
    ///
    /// [`AudioInitError::NoRuntime`] outside a tokio runtime and
    /// [`AudioInitError::InvalidStream`] for a source with a zero sample
    /// rate.  `source` is closed on error.
    pub fn start_with_source(
        &self,
        mut source: Box<dyn FrameSource>,
        target: Option<TargetPitch>,
    ) -> Result<(), AudioInitError> {
        self.stop();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                source.close();
                let e = AudioInitError::NoRuntime;
                self.fail(&e);
                return Err(e);
            }
        };
        if source.sample_rate() == 0 {
            source.close();
            let e = AudioInitError::InvalidStream("source reports a 0 Hz sample rate".into());
            self.fail(&e);
            return Err(e);
        }

        let inner = &self.inner;
        *lock(&inner.target) = target;
        *lock(&inner.latest_frame) = None;
        *lock(&inner.latest_metrics) = None;
        *lock(&inner.last_error) = None;
        inner.stalled.store(false, Ordering::SeqCst);

        let session_id = {
            let mut session = lock(&inner.gate);
            session.id = session.id.wrapping_add(1);
            session.source = Some(source);
            session.analyzer = MetricsAnalyzer::new(self.config.history_size);
            session.stall = StallDetector::new(
                Duration::from_millis(self.config.stall_grace_ms),
                (self.config.stall_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.config.stall_timeout_secs)),
            );
            session.started_at = Instant::now();
            session.ticks = 0;
            session.failures = 0;
            session.id
        };

        let period = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let task_inner = Arc::clone(inner);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let TickOutcome::Finished = task_inner.tick(session_id) {
                    break;
                }
            }
            log::debug!("engine: tick task for session {session_id} finished");
        });
        *lock(&inner.task) = Some(handle);

        inner.sessions.send_replace(session_id);
        inner.set_state(EngineState::Running);
        log::info!("engine started ({} ms tick)", period.as_millis());
        Ok(())
    }

    /// Stop ticking and release the audio source.
    ///
    /// Waits for an in-flight tick to finish; once this returns no listener
    /// is invoked for the stopped session.  Idempotent.
    pub fn stop(&self) {
        let inner = &self.inner;
        let task = {
            let mut session = lock(&inner.gate);
            let had_source = session.source.is_some();
            session.end();
            if had_source {
                log::info!("engine stopped");
            }
            lock(&inner.task).take()
        };
        if let Some(task) = task {
            task.abort();
        }
        inner.stalled.store(false, Ordering::SeqCst);
        inner.set_state(EngineState::Idle);
    }

    fn fail(&self, error: &AudioInitError) {
        log::error!("engine: failed to start: {error}");
        *lock(&self.inner.last_error) = Some(error.to_string());
        self.inner.set_state(EngineState::Error);
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a listener for every metrics snapshot.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&VocalMetrics) + Send + Sync + 'static,
    {
        let callback: MetricsCallback = Arc::new(callback);
        let id = self.inner.subscribers.add(callback);
        Subscription::new(id, &self.inner.subscribers)
    }

    /// Number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Follow lifecycle transitions.
    ///
    /// The channel keeps only the newest state, so a `stop()` directly
    /// followed by `start()` may be observed as `Running` throughout.  Use
    /// [`watch_sessions`](Self::watch_sessions) to see every new session.
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    /// Follow session starts: the value changes on every successful start,
    /// including a start that replaces a running session.
    pub fn watch_sessions(&self) -> watch::Receiver<u64> {
        self.inner.sessions.subscribe()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// `true` while the source has delivered no new samples for longer than
    /// the grace period.
    pub fn is_stalled(&self) -> bool {
        self.inner.stalled.load(Ordering::SeqCst)
    }

    /// Change the reference pitch; takes effect on the next tick.
    pub fn set_target_pitch(&self, target: Option<TargetPitch>) {
        *lock(&self.inner.target) = target;
    }

    pub fn target_pitch(&self) -> Option<TargetPitch> {
        *lock(&self.inner.target)
    }

    /// Newest analysed frame of the current session.
    pub fn latest_frame(&self) -> Option<Arc<AudioFrame>> {
        lock(&self.inner.latest_frame).clone()
    }

    /// Newest snapshot of the current session.
    pub fn latest_metrics(&self) -> Option<VocalMetrics> {
        *lock(&self.inner.latest_metrics)
    }

    /// Message of the last failed start, cleared by a successful start.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for VocalMetricsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
