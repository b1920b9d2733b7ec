use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::cart::CartState;
use crate::catalog::ProductCatalog;
use crate::config::AppConfig;
use crate::matcher::match_candidates;
use crate::output::RenderSink;
use crate::perception::PerceptionAdapter;
use crate::sampler::{FrameSampler, SamplerStats, SharedSource, TickResult};
use crate::types::{GestureResult, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Capturing,
    Checkout,
}

/// Inbound UI triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Restart,
    Stop,
}

/// Read-only view handed to UI consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub generation: u64,
    pub sampling: bool,
    pub cart: Vec<Product>,
    pub total: f64,
    pub gesture: Option<GestureResult>,
}

/// What happened to a completed tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Dispatched under an older generation; dropped.
    Stale,
    Folded { added: Vec<Product> },
    Checkout { added: Vec<Product>, gesture: GestureResult },
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub period: Duration,
    pub checkout_threshold: f32,
}

impl From<&AppConfig> for SessionOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            period: config.sampler.period(),
            checkout_threshold: config.gesture.checkout_threshold,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Owns the cart, lifecycle state and the frame source for one shopping session.
///
/// Single writer: only tick completions and commands handled here mutate state.
/// Everyone else reads [`SessionSnapshot`]s.
pub struct Session {
    state: SessionState,
    generation: u64,
    cart: CartState,
    gesture: Option<GestureResult>,
    catalog: ProductCatalog,
    source: SharedSource,
    source_held: bool,
    sampler: FrameSampler,
    results: mpsc::UnboundedReceiver<TickResult>,
    sink: Box<dyn RenderSink>,
    checkout_threshold: f32,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl Session {
    pub fn new(
        options: SessionOptions,
        catalog: ProductCatalog,
        source: SharedSource,
        adapter: PerceptionAdapter,
        sink: Box<dyn RenderSink>,
    ) -> Self {
        let (tx, results) = mpsc::unbounded_channel();
        let sampler = FrameSampler::new(options.period, source.clone(), Rc::new(adapter), tx);
        let cart = CartState::new();
        let (snapshots, _) = watch::channel(SessionSnapshot {
            state: SessionState::Capturing,
            generation: 0,
            sampling: false,
            cart: Vec::new(),
            total: 0.0,
            gesture: None,
        });
        Self {
            state: SessionState::Capturing,
            generation: 0,
            cart,
            gesture: None,
            catalog,
            source,
            source_held: false,
            sampler,
            results,
            sink,
            checkout_threshold: options.checkout_threshold,
            snapshots,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cart(&self) -> &CartState {
        &self.cart
    }

    pub fn gesture(&self) -> Option<&GestureResult> {
        self.gesture.as_ref()
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.is_running()
    }

    pub fn sampler_stats(&self) -> SamplerStats {
        self.sampler.stats()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            generation: self.generation,
            sampling: self.sampler.is_running(),
            cart: self.cart.entries().to_vec(),
            total: self.cart.total(),
            gesture: self.gesture.clone(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn acquire_source(&mut self) -> Result<()> {
        if !self.source_held {
            self.source.borrow_mut().acquire()?;
            self.source_held = true;
        }
        Ok(())
    }

    fn release_source(&mut self) {
        if self.source_held {
            self.source.borrow_mut().release();
            self.source_held = false;
        }
    }

    /// Begins sampling. A no-op while already sampling; from `Checkout` it behaves as [`Session::restart`].
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Checkout => self.restart(),
            SessionState::Capturing if self.sampler.is_running() => Ok(()),
            SessionState::Capturing => {
                self.acquire_source()?;
                self.sampler.start(self.generation);
                tracing::info!(generation = self.generation, "Session capturing");
                self.publish();
                Ok(())
            }
        }
    }

    /// Checkout -> Capturing with an empty cart. Ignored while capturing.
    ///
    /// If the frame source cannot be re-acquired nothing changes and the error is returned.
    pub fn restart(&mut self) -> Result<()> {
        if self.state != SessionState::Checkout {
            tracing::debug!("Restart ignored while capturing");
            return Ok(());
        }
        self.acquire_source()?;

        self.cart.clear();
        self.gesture = None;
        self.generation += 1;
        self.state = SessionState::Capturing;
        self.sampler.start(self.generation);
        self.sink.on_restart();
        tracing::info!(generation = self.generation, "Session restarted");
        self.publish();
        Ok(())
    }

    /// Stops sampling and releases the frame source. Idempotent.
    pub fn stop(&mut self) {
        if !self.sampler.is_running() && !self.source_held {
            return;
        }
        self.sampler.stop();
        self.release_source();
        self.generation += 1;
        tracing::info!(generation = self.generation, "Session stopped");
        self.publish();
    }

    fn checkout(&mut self, gesture: &GestureResult) {
        self.sampler.stop();
        self.release_source();
        self.generation += 1;
        self.state = SessionState::Checkout;
        tracing::info!(
            gesture = %gesture.name,
            score = gesture.score,
            items = self.cart.len(),
            total = self.cart.total(),
            "Checkout"
        );
        self.sink.on_checkout(&self.cart);
    }

    /// Folds one completed tick into the session.
    pub fn apply(&mut self, result: TickResult) -> Applied {
        if result.generation != self.generation || self.state != SessionState::Capturing {
            tracing::debug!(
                tick = result.tick,
                result_generation = result.generation,
                generation = self.generation,
                "Discarding stale tick"
            );
            return Applied::Stale;
        }

        let candidates = match_candidates(&result.detections, &self.catalog);
        let added = self.cart.fold(&candidates, &self.catalog);
        for product in &added {
            tracing::info!(product = %product.name, price = product.price, items = self.cart.len(), "Added to cart");
        }

        let gesture = result.detections.gesture.clone();
        if gesture.as_ref().map(|g| &g.name) != self.gesture.as_ref().map(|g| &g.name) {
            tracing::debug!(gesture = gesture.as_ref().map(|g| g.name.as_str()), "Gesture changed");
        }
        self.gesture = gesture;

        self.sink.on_frame(&result.image, &result.detections, &self.cart);

        let outcome = match self.gesture.clone() {
            Some(gesture) if gesture.score >= self.checkout_threshold => {
                self.checkout(&gesture);
                Applied::Checkout { added, gesture }
            }
            _ => Applied::Folded { added },
        };
        self.publish();
        outcome
    }

    /// Handles commands and tick completions until `Stop` arrives or the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Start) => {
                        if let Err(e) = self.start() {
                            tracing::error!(error = %e, "Failed to start session");
                        }
                    }
                    Some(SessionCommand::Restart) => {
                        if let Err(e) = self.restart() {
                            tracing::error!(error = %e, "Failed to restart session");
                        }
                    }
                    Some(SessionCommand::Stop) | None => {
                        self.stop();
                        break;
                    }
                },
                Some(result) = self.results.recv() => {
                    self.apply(result);
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.sampler.stop();
        self.release_source();
    }
}
