//! Frame composition requests and their outcomes.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use framefx_common::clock::TimestampNs;
use framefx_composition_model::instruction::{CompositionInstruction, TrackId};
use framefx_composition_model::track::InstructionTrack;

use crate::buffer::{DestinationAllocator, FrameBuffer};

/// Why a request produced no frame at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FailureReason {
    /// The routed source track had no frame for this timestamp.
    #[error("source frame unavailable")]
    SourceFrameUnavailable,

    /// No output buffer of the needed size/format could be produced.
    #[error("destination buffer allocation failed")]
    DestinationAllocationFailed,

    /// Nothing identified which source track to read.
    #[error("no source track could be determined")]
    RoutingUnavailable,

    /// Discarded by `cancel_all` before it started, or submitted to a
    /// stopped engine.
    #[error("request cancelled before rendering")]
    Cancelled,

    /// Host code (provider, allocator, backend) panicked while the request
    /// was being processed.
    #[error("request aborted by a panic on the render worker")]
    Aborted,
}

/// Result delivered to a completion sink.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered(FrameBuffer),
    Failed(FailureReason),
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    pub fn buffer(&self) -> Option<&FrameBuffer> {
        match self {
            Self::Rendered(buffer) => Some(buffer),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            Self::Rendered(_) => None,
            Self::Failed(reason) => Some(*reason),
        }
    }
}

/// Receives exactly one outcome, on the render worker thread.
pub type CompletionSink = Box<dyn FnOnce(RenderOutcome) + Send + 'static>;

/// A sink paired with a future-friendly receiver, for async callers.
pub fn completion_channel() -> (
    impl FnOnce(RenderOutcome) + Send + 'static,
    tokio::sync::oneshot::Receiver<RenderOutcome>,
) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let sink = move |outcome: RenderOutcome| {
        // The receiver may have given up waiting; nothing to deliver to.
        let _ = tx.send(outcome);
    };
    (sink, rx)
}

/// Supplies decoded source frames by track.
pub trait SourceFrameProvider: Send + Sync {
    /// The frame for `track` at the request's timestamp, if decoded.
    fn frame(&self, track: TrackId) -> Option<FrameBuffer>;

    /// Tracks this provider can serve, used to recover routing when no
    /// instruction names one.
    fn track_ids(&self) -> Vec<TrackId>;
}

impl SourceFrameProvider for HashMap<TrackId, FrameBuffer> {
    fn frame(&self, track: TrackId) -> Option<FrameBuffer> {
        self.get(&track).cloned()
    }

    fn track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Where the engine gets the active instruction from.
#[derive(Debug, Clone)]
pub enum InstructionSource {
    /// The caller already resolved the instruction (once per segment).
    Resolved(Arc<CompositionInstruction>),
    /// Look the timestamp up in this track snapshot.
    Track(Arc<InstructionTrack>),
    /// Instruction metadata was not usable; only routing hints remain.
    Unresolved { track_hints: Vec<TrackId> },
}

/// Process-unique request identity, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// One unit of work: produce the output frame for a timestamp.
pub struct FrameRequest {
    pub(crate) id: RequestId,
    pub(crate) timestamp_ns: TimestampNs,
    pub(crate) instruction: InstructionSource,
    pub(crate) default_track: Option<TrackId>,
    pub(crate) sources: Arc<dyn SourceFrameProvider>,
    pub(crate) allocator: Arc<dyn DestinationAllocator>,
    pub(crate) completion: CompletionSink,
}

impl FrameRequest {
    /// A request with no instruction information yet; attach one with
    /// [`with_instruction`](Self::with_instruction) or
    /// [`with_track`](Self::with_track).
    pub fn new<F>(
        timestamp_ns: TimestampNs,
        sources: Arc<dyn SourceFrameProvider>,
        allocator: Arc<dyn DestinationAllocator>,
        completion: F,
    ) -> Self
    where
        F: FnOnce(RenderOutcome) + Send + 'static,
    {
        Self {
            id: RequestId::next(),
            timestamp_ns,
            instruction: InstructionSource::Unresolved {
                track_hints: Vec::new(),
            },
            default_track: None,
            sources,
            allocator,
            completion: Box::new(completion),
        }
    }

    pub fn with_instruction(mut self, instruction: Arc<CompositionInstruction>) -> Self {
        self.instruction = InstructionSource::Resolved(instruction);
        self
    }

    pub fn with_track(mut self, track: Arc<InstructionTrack>) -> Self {
        self.instruction = InstructionSource::Track(track);
        self
    }

    pub fn with_routing_hints(mut self, track_hints: Vec<TrackId>) -> Self {
        self.instruction = InstructionSource::Unresolved { track_hints };
        self
    }

    /// Track used when no instruction covers the timestamp.
    pub fn with_default_track(mut self, track: TrackId) -> Self {
        self.default_track = Some(track);
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn timestamp_ns(&self) -> TimestampNs {
        self.timestamp_ns
    }

    /// Route the completion through a slot the worker keeps, so a request
    /// interrupted by a panic can still be completed exactly once.
    pub(crate) fn guard_completion(mut self) -> (Self, PendingCompletion) {
        let slot: Arc<Mutex<Option<CompletionSink>>> =
            Arc::new(Mutex::new(Some(self.completion)));
        let pending = PendingCompletion { slot: slot.clone() };
        self.completion = Box::new(move |outcome| {
            if let Some(sink) = take_sink(&slot) {
                sink(outcome);
            }
        });
        (self, pending)
    }
}

fn take_sink(slot: &Mutex<Option<CompletionSink>>) -> Option<CompletionSink> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

/// The worker's handle on a request's completion sink.
pub(crate) struct PendingCompletion {
    slot: Arc<Mutex<Option<CompletionSink>>>,
}

impl PendingCompletion {
    /// The sink, unless it has already been invoked.
    pub(crate) fn take(&self) -> Option<CompletionSink> {
        take_sink(&self.slot)
    }
}

impl fmt::Debug for FrameRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRequest")
            .field("id", &self.id)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("instruction", &self.instruction)
            .field("default_track", &self.default_track)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a request on the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Resolving,
    Passthrough,
    Rendering,
    Completed { success: bool },
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    fn can_advance_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Queued, Resolving)
                | (Queued, Completed { success: false })
                | (Resolving, Passthrough)
                | (Resolving, Rendering)
                | (Resolving, Completed { success: false })
                | (Passthrough, Completed { .. })
                | (Rendering, Completed { .. })
        )
    }
}

/// Tracks one request's state and logs transitions.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    id: RequestId,
    state: RequestState,
}

impl Lifecycle {
    pub(crate) fn new(id: RequestId) -> Self {
        Self {
            id,
            state: RequestState::Queued,
        }
    }

    pub(crate) fn state(&self) -> RequestState {
        self.state
    }

    /// Move to `next`; illegal transitions are refused and logged.
    pub(crate) fn advance(&mut self, next: RequestState) -> bool {
        if !self.state.can_advance_to(next) {
            tracing::error!(request = %self.id, from = ?self.state, to = ?next, "Illegal request state transition");
            return false;
        }
        tracing::trace!(request = %self.id, from = ?self.state, to = ?next, "Request state");
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferPool, PixelFormat};

    #[test]
    fn test_lifecycle_happy_paths() {
        let mut lc = Lifecycle::new(RequestId::next());
        assert!(lc.advance(RequestState::Resolving));
        assert!(lc.advance(RequestState::Rendering));
        assert!(lc.advance(RequestState::Completed { success: true }));
        assert!(lc.state().is_terminal());

        let mut lc = Lifecycle::new(RequestId::next());
        assert!(lc.advance(RequestState::Resolving));
        assert!(lc.advance(RequestState::Passthrough));
        assert!(lc.advance(RequestState::Completed { success: false }));
    }

    #[test]
    fn test_terminal_state_not_reentered() {
        let mut lc = Lifecycle::new(RequestId::next());
        assert!(lc.advance(RequestState::Completed { success: false }));
        assert!(!lc.advance(RequestState::Completed { success: false }));
        assert!(!lc.advance(RequestState::Resolving));
        assert_eq!(lc.state(), RequestState::Completed { success: false });
    }

    #[test]
    fn test_cannot_skip_resolution() {
        let mut lc = Lifecycle::new(RequestId::next());
        assert!(!lc.advance(RequestState::Rendering));
        assert!(!lc.advance(RequestState::Completed { success: true }));
        assert_eq!(lc.state(), RequestState::Queued);
    }

    #[test]
    fn test_hashmap_provider_sorted_ids() {
        let mut sources = HashMap::new();
        let buf = FrameBuffer::new(1, 1, PixelFormat::Gray8).unwrap();
        sources.insert(TrackId(9), buf.clone());
        sources.insert(TrackId(2), buf.clone());
        assert_eq!(sources.track_ids(), vec![TrackId(2), TrackId(9)]);
        assert!(sources.frame(TrackId(9)).unwrap().ptr_eq(&buf));
        assert!(sources.frame(TrackId(1)).is_none());
    }

    #[test]
    fn test_guarded_completion_runs_once() {
        let provider: Arc<dyn SourceFrameProvider> = Arc::new(HashMap::new());
        let pool = Arc::new(BufferPool::new(1, 1, PixelFormat::Gray8, 1));
        let (tx, rx) = std::sync::mpsc::channel();
        let request = FrameRequest::new(0, provider, pool, move |outcome: RenderOutcome| {
            tx.send(outcome.failure()).ok();
        });

        let (request, pending) = request.guard_completion();
        (request.completion)(RenderOutcome::Failed(FailureReason::RoutingUnavailable));
        assert!(pending.take().is_none());
        assert_eq!(rx.try_recv().unwrap(), Some(FailureReason::RoutingUnavailable));
    }

    #[test]
    fn test_pending_completion_outlives_dropped_request() {
        let provider: Arc<dyn SourceFrameProvider> = Arc::new(HashMap::new());
        let pool = Arc::new(BufferPool::new(1, 1, PixelFormat::Gray8, 1));
        let (tx, rx) = std::sync::mpsc::channel();
        let request = FrameRequest::new(0, provider, pool, move |outcome: RenderOutcome| {
            tx.send(outcome.failure()).ok();
        });

        let (request, pending) = request.guard_completion();
        drop(request);
        let sink = pending.take().expect("sink still pending");
        sink(RenderOutcome::Failed(FailureReason::Aborted));
        assert_eq!(rx.try_recv().unwrap(), Some(FailureReason::Aborted));
    }

    #[tokio::test]
    async fn test_completion_channel_delivers() {
        let (sink, rx) = completion_channel();
        sink(RenderOutcome::Failed(FailureReason::RoutingUnavailable));
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.failure(), Some(FailureReason::RoutingUnavailable));
    }
}
