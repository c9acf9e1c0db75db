//! The composition engine: a serial render worker fed by a queue.
//!
//! `submit` never blocks. Requests run one at a time, in submission order,
//! on a dedicated thread that owns the rendering context, so completions
//! arrive in submission order too. Completion sinks are invoked on that
//! worker thread.
//!
//! Cancellation uses an epoch counter: each queued job remembers the epoch
//! it was submitted in, and `cancel_all` bumps it. The worker completes
//! stale jobs with [`FailureReason::Cancelled`] instead of rendering them.
//! A render already in progress is not interrupted.
//!
//! A panic in host code reached from the worker (a provider, an allocator,
//! a registered backend, or a completion sink) is caught per request. The
//! request is completed with [`FailureReason::Aborted`] if its sink has not
//! run yet, and the worker moves on to the next job.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};

use framefx_common::config::EngineConfig;
use framefx_common::error::{FramefxError, FramefxResult};
use framefx_composition_model::catalog::FilterCatalog;

use crate::backend::{BackendFactory, SoftwareBackendFactory};
use crate::compositor::{Compositor, LazyContext};
use crate::request::{FailureReason, FrameRequest, RenderOutcome};

struct Job {
    epoch: u64,
    request: FrameRequest,
}

/// Live counters shared between the engine handle and its worker.
#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    submitted: AtomicU64,
    passthrough: AtomicU64,
    filtered: AtomicU64,
    degraded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl EngineCounters {
    fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_passthrough(&self) {
        self.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            passthrough: self.passthrough.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Requests accepted by `submit`.
    pub submitted: u64,
    /// Completed with the source buffer unchanged.
    pub passthrough: u64,
    /// Completed with a filtered render.
    pub filtered: u64,
    /// Filter requested but an unfiltered frame was delivered instead.
    pub degraded: u64,
    /// Completed with a failure other than cancellation.
    pub failed: u64,
    /// Discarded by `cancel_all` (or submitted after the worker stopped).
    pub cancelled: u64,
}

impl EngineStats {
    /// Requests that have reached a terminal state.
    pub fn completed(&self) -> u64 {
        self.passthrough + self.filtered + self.degraded + self.failed + self.cancelled
    }
}

/// Configures and starts a [`CompositionEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    catalog: Arc<FilterCatalog>,
    hardware: Option<Arc<dyn BackendFactory>>,
    software: Arc<dyn BackendFactory>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a hardware backend to try before software.
    pub fn hardware_backend(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.hardware = Some(factory);
        self
    }

    /// Replace the software fallback backend.
    pub fn software_backend(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.software = factory;
        self
    }

    /// Spawn the render worker. The rendering context itself is built
    /// lazily by the worker on the first filtered frame.
    pub fn build(self) -> FramefxResult<CompositionEngine> {
        let counters = Arc::new(EngineCounters::default());
        let epoch = Arc::new(AtomicU64::new(0));
        let (tx, rx) = unbounded::<Job>();

        let mut compositor = Compositor::new(
            self.catalog,
            LazyContext::new(self.config.backend, self.hardware, self.software),
            counters.clone(),
        );

        let worker_epoch = epoch.clone();
        let worker_counters = counters.clone();
        let priority = self.config.worker_priority;
        let handle = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || {
                tracing::debug!(priority = priority.as_str(), "Render worker started");

                // Runs until every sender is dropped and the queue is drained.
                while let Ok(job) = rx.recv() {
                    let stale = job.epoch != worker_epoch.load(Ordering::SeqCst);
                    let (request, pending) = job.request.guard_completion();
                    let id = request.id();

                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        if stale {
                            compositor.discard(request);
                        } else {
                            compositor.process(request);
                        }
                    }));

                    if let Err(payload) = result {
                        tracing::error!(
                            request = %id,
                            panic = panic_message(payload.as_ref()),
                            "Panic while processing request; worker continues"
                        );
                        if let Some(sink) = pending.take() {
                            worker_counters.record_failed();
                            let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                                sink(RenderOutcome::Failed(FailureReason::Aborted))
                            }));
                            if delivered.is_err() {
                                tracing::error!(request = %id, "Completion sink panicked");
                            }
                        }
                    }
                }

                tracing::debug!("Render worker stopped");
            })
            .map_err(|e| FramefxError::render(format!("failed to spawn render worker: {e}")))?;

        tracing::info!(
            worker = %self.config.worker_name,
            backend = ?self.config.backend,
            priority = priority.as_str(),
            "Composition engine started"
        );

        Ok(CompositionEngine {
            sender: Some(tx),
            worker: Some(handle),
            epoch,
            counters,
            config: self.config,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Asynchronous frame-rendering engine.
pub struct CompositionEngine {
    sender: Option<Sender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
    epoch: Arc<AtomicU64>,
    counters: Arc<EngineCounters>,
    config: EngineConfig,
}

impl CompositionEngine {
    /// Start configuring an engine that reads filters from `catalog`.
    pub fn builder(catalog: Arc<FilterCatalog>) -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            catalog,
            hardware: None,
            software: Arc::new(SoftwareBackendFactory),
        }
    }

    /// An engine with the given config and only the software backend.
    pub fn new(config: EngineConfig, catalog: Arc<FilterCatalog>) -> FramefxResult<Self> {
        Self::builder(catalog).config(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queue a request. Returns immediately; the outcome is delivered to
    /// the request's completion sink on the render worker.
    pub fn submit(&self, request: FrameRequest) {
        self.counters.record_submitted();
        let job = Job {
            epoch: self.epoch.load(Ordering::SeqCst),
            request,
        };

        let Some(sender) = &self.sender else {
            self.reject(job.request);
            return;
        };
        if let Err(e) = sender.send(job) {
            tracing::error!("Render worker is gone; cancelling request");
            self.reject(e.into_inner().request);
        }
    }

    fn reject(&self, request: FrameRequest) {
        self.counters.record_cancelled();
        (request.completion)(RenderOutcome::Failed(FailureReason::Cancelled));
    }

    /// Discard every request that has not started rendering yet. Each is
    /// completed with [`FailureReason::Cancelled`]. Does not block and does
    /// not interrupt a render in progress.
    pub fn cancel_all(&self) {
        let previous = self.epoch.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(epoch = previous + 1, "Cancelling queued requests");
    }

    /// Requests queued but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    /// Stop accepting work, let the worker drain the queue, and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the sender closes the queue; the worker exits once drained.
        self.sender.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Render worker panicked");
            }
        }
    }
}

impl Drop for CompositionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CompositionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionEngine")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
