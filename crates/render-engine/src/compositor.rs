//! Frame compositor: resolves the active instruction for a request and
//! produces its output frame.
//!
//! Runs on the engine's render worker only. Per request:
//!
//! ```text
//! resolve instruction ──┬── no filter ──► source buffer, untouched
//!                       │
//!                       └── filter ──► allocate dest ──► wrap source
//!                                                            │
//!                        bind defaults, then overrides ◄─────┘
//!                                        │
//!                                   render into dest
//!                                        │
//!                         (any mishap: unfiltered source into dest)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use framefx_common::config::BackendPreference;
use framefx_composition_model::catalog::FilterCatalog;
use framefx_composition_model::instruction::{CompositionInstruction, TrackId};
use framefx_composition_model::params::{ParamMap, ParamValue};

use crate::backend::BackendFactory;
use crate::buffer::{DestinationAllocator, FrameBuffer};
use crate::context::RenderingContext;
use crate::engine::EngineCounters;
use crate::image::Bounds;
use crate::request::{
    FailureReason, FrameRequest, InstructionSource, Lifecycle, RenderOutcome, RequestState,
    SourceFrameProvider,
};

/// Rendering context built on first use.
pub(crate) struct LazyContext {
    preference: BackendPreference,
    hardware: Option<Arc<dyn BackendFactory>>,
    software: Arc<dyn BackendFactory>,
    state: ContextState,
}

enum ContextState {
    Unbuilt,
    Ready(RenderingContext),
    Unavailable,
}

impl LazyContext {
    pub(crate) fn new(
        preference: BackendPreference,
        hardware: Option<Arc<dyn BackendFactory>>,
        software: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            preference,
            hardware,
            software,
            state: ContextState::Unbuilt,
        }
    }

    /// The context, building it on the first call. Construction is
    /// attempted once; a failure is remembered.
    pub(crate) fn get(&mut self) -> Option<&mut RenderingContext> {
        if let ContextState::Unbuilt = self.state {
            self.state = match RenderingContext::build(
                self.preference,
                self.hardware.as_deref(),
                self.software.as_ref(),
            ) {
                Ok(ctx) => ContextState::Ready(ctx),
                Err(e) => {
                    tracing::error!(error = %e, "Rendering context unavailable; filtered frames will pass through");
                    ContextState::Unavailable
                }
            };
        }
        match &mut self.state {
            ContextState::Ready(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// Parameter binding order: every default (sorted by key), then every
/// override (sorted by key). An override that fails to bind leaves the
/// default already bound for that key in effect.
pub(crate) fn binding_order<'a>(
    defaults: &'a ParamMap,
    overrides: &'a ParamMap,
) -> Vec<(&'a str, &'a ParamValue)> {
    defaults
        .iter()
        .chain(overrides.iter())
        .map(|(name, value)| (name.as_str(), value))
        .collect()
}

/// Pick the source track for a request.
///
/// An active instruction's routing is authoritative. Without one, the
/// first recoverable hint wins: explicit hints, then the request default,
/// then whatever the provider serves. `None` means nothing identified a
/// track at all.
fn route(
    active: Option<&CompositionInstruction>,
    source: &InstructionSource,
    default_track: Option<TrackId>,
    sources: &dyn SourceFrameProvider,
) -> Option<TrackId> {
    if let Some(instruction) = active {
        return Some(instruction.source_track_id);
    }

    let hints: &[TrackId] = match source {
        InstructionSource::Unresolved { track_hints } => track_hints.as_slice(),
        _ => &[],
    };
    let candidates: Vec<TrackId> = hints
        .iter()
        .copied()
        .chain(default_track)
        .chain(sources.track_ids())
        .collect();

    candidates
        .iter()
        .copied()
        .find(|&track| sources.frame(track).is_some())
        .or_else(|| candidates.first().copied())
}

pub(crate) struct Compositor {
    catalog: Arc<FilterCatalog>,
    context: LazyContext,
    counters: Arc<EngineCounters>,
    warned_filters: HashSet<String>,
}

impl Compositor {
    pub(crate) fn new(
        catalog: Arc<FilterCatalog>,
        context: LazyContext,
        counters: Arc<EngineCounters>,
    ) -> Self {
        Self {
            catalog,
            context,
            counters,
            warned_filters: HashSet::new(),
        }
    }

    /// Complete a request that was discarded before it started.
    pub(crate) fn discard(&self, request: FrameRequest) {
        let mut lifecycle = Lifecycle::new(request.id);
        lifecycle.advance(RequestState::Completed { success: false });
        self.counters.record_cancelled();
        tracing::debug!(request = %request.id, timestamp_ns = request.timestamp_ns, "Discarding cancelled request");
        (request.completion)(RenderOutcome::Failed(FailureReason::Cancelled));
    }

    /// Produce the output for one request and complete it.
    pub(crate) fn process(&mut self, request: FrameRequest) {
        let FrameRequest {
            id,
            timestamp_ns,
            instruction,
            default_track,
            sources,
            allocator,
            completion,
        } = request;

        let mut lifecycle = Lifecycle::new(id);
        lifecycle.advance(RequestState::Resolving);

        let active: Option<Arc<CompositionInstruction>> = match &instruction {
            InstructionSource::Resolved(inst) => Some(inst.clone()),
            InstructionSource::Track(track) => track.lookup(timestamp_ns).cloned(),
            InstructionSource::Unresolved { .. } => None,
        };

        let outcome = match route(active.as_deref(), &instruction, default_track, sources.as_ref()) {
            None => RenderOutcome::Failed(FailureReason::RoutingUnavailable),
            Some(track) => match sources.frame(track) {
                None => {
                    tracing::debug!(request = %id, timestamp_ns, track_id = %track, "Source frame unavailable");
                    RenderOutcome::Failed(FailureReason::SourceFrameUnavailable)
                }
                Some(source) => match active.as_deref().and_then(|inst| inst.filter().map(|f| (inst, f))) {
                    None => {
                        lifecycle.advance(RequestState::Passthrough);
                        self.counters.record_passthrough();
                        RenderOutcome::Rendered(source)
                    }
                    Some((inst, filter_id)) => {
                        lifecycle.advance(RequestState::Rendering);
                        self.render_filtered(inst, filter_id, source, allocator.as_ref())
                    }
                },
            },
        };

        let success = outcome.is_rendered();
        if !lifecycle.state().is_terminal() {
            lifecycle.advance(RequestState::Completed { success });
        }
        if let Some(reason) = outcome.failure() {
            self.counters.record_failed();
            tracing::debug!(request = %id, timestamp_ns, %reason, "Request failed");
        }
        completion(outcome);
    }

    fn render_filtered(
        &mut self,
        instruction: &CompositionInstruction,
        filter_id: &str,
        source: FrameBuffer,
        allocator: &dyn DestinationAllocator,
    ) -> RenderOutcome {
        let Some(ctx) = self.context.get() else {
            self.counters.record_degraded();
            return RenderOutcome::Rendered(source);
        };

        let Some(dest) = allocator.allocate() else {
            return RenderOutcome::Failed(FailureReason::DestinationAllocationFailed);
        };
        let (target_w, target_h) = allocator.target_size();
        if (dest.width(), dest.height()) != (target_w, target_h) {
            tracing::warn!(
                expected = ?(target_w, target_h),
                actual = ?(dest.width(), dest.height()),
                "Allocator returned a buffer of unexpected size"
            );
        }
        let bounds = Bounds::of(&dest);

        let descriptor = self.catalog.get(filter_id);
        let filter = descriptor.and_then(|d| ctx.instantiate_filter(&d.backend_name));

        let filtered = match (descriptor, filter) {
            (Some(descriptor), Some(mut filter)) => {
                for (name, value) in binding_order(&descriptor.defaults, &instruction.parameters) {
                    ctx.set_parameter(&mut filter, name, value);
                }
                filter.set_input(ctx.create_filterable(&source));
                match filter.output_image() {
                    Some(image) => ctx.render(&image, &dest, bounds),
                    None => {
                        tracing::warn!(filter = filter_id, "Filter produced no output image");
                        false
                    }
                }
            }
            _ => {
                warn_unknown_filter(&mut self.warned_filters, filter_id);
                false
            }
        };

        if filtered {
            self.counters.record_filtered();
            return RenderOutcome::Rendered(dest);
        }

        // Unfiltered source into dest, else the source buffer itself.
        self.counters.record_degraded();
        let unfiltered = ctx.create_filterable(&source);
        if ctx.render(&unfiltered, &dest, bounds) {
            RenderOutcome::Rendered(dest)
        } else {
            tracing::warn!(filter = filter_id, "Unfiltered render failed; passing source through");
            RenderOutcome::Rendered(source)
        }
    }
}

fn warn_unknown_filter(warned: &mut HashSet<String>, filter_id: &str) {
    if warned.insert(filter_id.to_string()) {
        tracing::warn!(filter = filter_id, "Unknown filter; rendering frames unfiltered");
    } else {
        tracing::trace!(filter = filter_id, "Unknown filter");
    }
}
