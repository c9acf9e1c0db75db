//! Framefx Render Engine
//!
//! The frame composition pipeline: for each decoded frame the playback or
//! export side submits a request, the engine resolves which filter
//! instruction applies at that timestamp, and it renders a filtered
//! replacement frame through one shared rendering context.
//!
//! # Pipeline Architecture
//!
//! ```text
//! editing model ──► InstructionTrack snapshot ──┐
//!                                               │
//! decoder ──► SourceFrameProvider ──────────────┼──► FrameRequest
//!                                               │         │
//! playback ──► DestinationAllocator ────────────┘         ▼
//!                                                 CompositionEngine
//!                                                  (serial worker)
//!                                                         │
//!                                     RenderingContext (hardware │ software)
//!                                                         │
//!                                                         ▼
//!                                    completion sink: Rendered │ Failed
//! ```
//!
//! Only conditions that make any output impossible are failures. An
//! unknown filter, a bad parameter, or an empty render all degrade to an
//! unfiltered frame.

pub mod backend;
pub mod buffer;
pub mod cache;
mod compositor;
pub mod context;
pub mod engine;
pub mod filters;
pub mod image;
pub mod request;

pub use backend::{BackendFactory, BackendKind, RenderBackend, SoftwareBackend, SoftwareBackendFactory};
pub use buffer::{BufferError, BufferId, BufferPool, DestinationAllocator, FrameBuffer, PixelFormat, PoolStats};
pub use cache::{AssetId, CacheKey, FrameCache};
pub use context::{Filter, RenderingContext};
pub use engine::{CompositionEngine, EngineBuilder, EngineStats};
pub use image::{Bounds, FilterableImage};
pub use request::{
    completion_channel, CompletionSink, FailureReason, FrameRequest, InstructionSource,
    RenderOutcome, RequestId, RequestState, SourceFrameProvider,
};
