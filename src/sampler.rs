use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::camera::{Frame, FrameSource};
use crate::perception::PerceptionAdapter;
use crate::types::DetectionFrame;

pub type SharedSource = Rc<RefCell<dyn FrameSource>>;

/// Output of one completed tick, tagged with the session generation it was dispatched under.
#[derive(Debug, Clone)]
pub struct TickResult {
    pub generation: u64,
    pub tick: u64,
    pub image: Frame,
    pub detections: DetectionFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Dispatched(u64),
    /// A previous tick's inference is still running.
    Busy,
    NotReady,
    CaptureFailed,
    Stopped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SamplerStats {
    pub dispatched: u64,
    pub skipped_busy: u64,
    pub skipped_not_ready: u64,
    pub capture_failures: u64,
}

/// Clears the single-flight flag when the inference task ends, including by panic.
struct InFlight<'a>(&'a Cell<bool>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::warn!("Inference panicked, tick dropped");
        }
        self.0.set(false);
    }
}

struct SamplerCore {
    source: SharedSource,
    adapter: Rc<PerceptionAdapter>,
    results: mpsc::UnboundedSender<TickResult>,
    in_flight: Cell<bool>,
    running: Cell<bool>,
    generation: Cell<u64>,
    ticks: Cell<u64>,
    stats: Cell<SamplerStats>,
}

impl SamplerCore {
    fn record(&self, update: impl FnOnce(&mut SamplerStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    fn tick(self: &Rc<Self>) -> TickOutcome {
        if !self.running.get() {
            return TickOutcome::Stopped;
        }
        if self.in_flight.get() {
            self.record(|s| s.skipped_busy += 1);
            tracing::debug!("Inference still in flight, skipping tick");
            return TickOutcome::Busy;
        }

        let image = {
            let mut source = self.source.borrow_mut();
            if !source.is_ready() {
                self.record(|s| s.skipped_not_ready += 1);
                return TickOutcome::NotReady;
            }
            match source.capture() {
                Ok(image) => image,
                Err(e) => {
                    self.record(|s| s.capture_failures += 1);
                    tracing::warn!(error = %e, "Frame capture failed, skipping tick");
                    return TickOutcome::CaptureFailed;
                }
            }
        };

        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        self.in_flight.set(true);
        self.record(|s| s.dispatched += 1);

        let generation = self.generation.get();
        let core = Rc::clone(self);
        tokio::task::spawn_local(async move {
            let guard = InFlight(&core.in_flight);
            let detections = core.adapter.perceive(&image).await;
            drop(guard);
            // The session may already be gone during shutdown.
            let _ = core.results.send(TickResult {
                generation,
                tick,
                image,
                detections,
            });
        });
        TickOutcome::Dispatched(tick)
    }
}

/// Drives perception at a fixed period with at most one inference in flight.
///
/// Must be used from inside a [`tokio::task::LocalSet`].
pub struct FrameSampler {
    period: Duration,
    core: Rc<SamplerCore>,
    timer: Option<JoinHandle<()>>,
}

impl FrameSampler {
    pub fn new(
        period: Duration,
        source: SharedSource,
        adapter: Rc<PerceptionAdapter>,
        results: mpsc::UnboundedSender<TickResult>,
    ) -> Self {
        Self {
            period,
            core: Rc::new(SamplerCore {
                source,
                adapter,
                results,
                in_flight: Cell::new(false),
                running: Cell::new(false),
                generation: Cell::new(0),
                ticks: Cell::new(0),
                stats: Cell::new(SamplerStats::default()),
            }),
            timer: None,
        }
    }

    /// Begins ticking; results are tagged with `generation`. Restarts the timer if already running.
    pub fn start(&mut self, generation: u64) {
        self.stop();
        self.core.generation.set(generation);
        self.core.running.set(true);

        let core = Rc::clone(&self.core);
        let period = self.period;
        self.timer = Some(tokio::task::spawn_local(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                core.tick();
            }
        }));
        tracing::debug!(generation, period_ms = period.as_millis() as u64, "Sampler started");
    }

    /// Cancels future ticks. An inference already in flight still completes and reports.
    pub fn stop(&mut self) {
        self.core.running.set(false);
        if let Some(timer) = self.timer.take() {
            timer.abort();
            tracing::debug!("Sampler stopped");
        }
    }

    /// Runs one tick immediately, outside the timer.
    pub fn tick(&self) -> TickOutcome {
        self.core.tick()
    }

    pub fn is_running(&self) -> bool {
        self.core.running.get()
    }

    pub fn in_flight(&self) -> bool {
        self.core.in_flight.get()
    }

    pub fn stats(&self) -> SamplerStats {
        self.core.stats.get()
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
