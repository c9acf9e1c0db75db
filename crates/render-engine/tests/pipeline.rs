//! End-to-end tests through the composition engine's render worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver};

use framefx_common::clock::secs_to_ns;
use framefx_common::config::{BackendPreference, EngineConfig};
use framefx_common::error::{FramefxError, FramefxResult};
use framefx_composition_model::{
    CompositionInstruction, FilterCatalog, InstructionTrack, Rgba, TimeRange, TrackId,
};
use framefx_render_engine::filters::{self, FilterKernel, SepiaTone};
use framefx_render_engine::{
    completion_channel, BackendFactory, BackendKind, Bounds, BufferPool, CompositionEngine,
    DestinationAllocator, FailureReason, FilterableImage, FrameBuffer, FrameRequest, PixelFormat,
    RenderBackend, RenderOutcome, SoftwareBackend, SourceFrameProvider,
};

const TRACK: TrackId = TrackId(1);
const WAIT: Duration = Duration::from_secs(5);

fn engine() -> CompositionEngine {
    CompositionEngine::new(EngineConfig::default(), Arc::new(FilterCatalog::builtin()))
        .expect("engine starts")
}

fn source(width: u32, height: u32, rgba: [u8; 4]) -> FrameBuffer {
    let buf = FrameBuffer::new(width, height, PixelFormat::Bgra8).unwrap();
    buf.fill(rgba);
    buf
}

fn provider(buffer: &FrameBuffer) -> Arc<dyn SourceFrameProvider> {
    let mut map = HashMap::new();
    map.insert(TRACK, buffer.clone());
    Arc::new(map)
}

fn sepia_track() -> Arc<InstructionTrack> {
    Arc::new(
        InstructionTrack::new(vec![CompositionInstruction::new(
            TimeRange::from_secs(0.0, 5.0).unwrap(),
            TRACK,
        )
        .with_filter("sepia")
        .with_param("intensity", 0.8)])
        .unwrap(),
    )
}

/// Submit a request and hand back a receiver for its outcome.
fn submit(
    engine: &CompositionEngine,
    build: impl FnOnce(Box<dyn FnOnce(RenderOutcome) + Send>) -> FrameRequest,
) -> Receiver<RenderOutcome> {
    let (tx, rx) = bounded(1);
    engine.submit(build(Box::new(move |outcome| {
        tx.send(outcome).ok();
    })));
    rx
}

fn expected_sepia(rgba: [u8; 4], intensity: f32) -> [u8; 4] {
    let px = [rgba[0] as f32 / 255.0, rgba[1] as f32 / 255.0, rgba[2] as f32 / 255.0, 1.0];
    let tone = SepiaTone::tone(px);
    let mix = |a: f32, b: f32| ((a + (b - a) * intensity).clamp(0.0, 1.0) * 255.0).round() as u8;
    [mix(px[0], tone[0]), mix(px[1], tone[1]), mix(px[2], tone[2]), rgba[3]]
}

#[test]
fn sepia_override_applies_instead_of_default() {
    let engine = engine();
    let color = [120, 90, 60, 255];
    let src = source(100, 100, color);
    let pool = Arc::new(BufferPool::new(100, 100, PixelFormat::Bgra8, 3));

    let rx = submit(&engine, |sink| {
        FrameRequest::new(secs_to_ns(2.0), provider(&src), pool.clone(), sink).with_track(sepia_track())
    });
    let outcome = rx.recv_timeout(WAIT).unwrap();

    let out = outcome.buffer().expect("rendered");
    assert_eq!((out.width(), out.height()), (100, 100));
    assert!(!out.ptr_eq(&src));
    assert_eq!(out.pixel_rgba(50, 50), Some(expected_sepia(color, 0.8)));
    assert_ne!(out.pixel_rgba(50, 50), Some(expected_sepia(color, 1.0)));
    // The source frame is never written to.
    assert_eq!(src.pixel_rgba(50, 50), Some(color));
    assert_eq!(engine.stats().filtered, 1);
}

#[test]
fn outside_all_instructions_passes_source_through() {
    let engine = engine();
    let src = source(16, 16, [1, 2, 3, 255]);
    let pool = Arc::new(BufferPool::new(16, 16, PixelFormat::Bgra8, 3));

    let rx = submit(&engine, |sink| {
        FrameRequest::new(secs_to_ns(10.0), provider(&src), pool.clone(), sink)
            .with_track(sepia_track())
            .with_default_track(TRACK)
    });
    let outcome = rx.recv_timeout(WAIT).unwrap();

    let out = outcome.buffer().expect("rendered");
    assert!(out.ptr_eq(&src));
    assert_eq!(out.id(), src.id());
    assert_eq!(pool.stats().allocated, 0);
    assert_eq!(engine.stats().passthrough, 1);
}

#[test]
fn instruction_end_boundary_is_exclusive() {
    let engine = engine();
    let src = source(4, 4, [200, 100, 50, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 3));

    let at_end = submit(&engine, |sink| {
        FrameRequest::new(secs_to_ns(5.0), provider(&src), pool.clone(), sink).with_track(sepia_track())
    });
    assert!(at_end.recv_timeout(WAIT).unwrap().buffer().unwrap().ptr_eq(&src));
}

#[test]
fn unknown_filter_still_renders_unfiltered() {
    let engine = engine();
    let color = [10, 200, 30, 255];
    let src = source(8, 8, color);
    let pool = Arc::new(BufferPool::new(8, 8, PixelFormat::Bgra8, 3));
    let inst = Arc::new(
        CompositionInstruction::new(TimeRange::from_secs(0.0, 1.0).unwrap(), TRACK).with_filter("no-such-filter"),
    );

    let rx = submit(&engine, |sink| {
        FrameRequest::new(0, provider(&src), pool.clone(), sink).with_instruction(inst)
    });
    let outcome = rx.recv_timeout(WAIT).unwrap();

    assert!(outcome.is_rendered());
    assert_eq!(outcome.buffer().unwrap().pixel_rgba(7, 7), Some(color));
    assert_eq!(engine.stats().degraded, 1);
}

#[test]
fn bad_parameter_is_skipped_not_fatal() {
    let engine = engine();
    let color = [120, 90, 60, 255];
    let src = source(4, 4, color);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 3));
    let inst = Arc::new(
        CompositionInstruction::new(TimeRange::from_secs(0.0, 1.0).unwrap(), TRACK)
            .with_filter("sepia")
            .with_param("intensity", Rgba::WHITE)
            .with_param("sparkle", 3.0),
    );

    let rx = submit(&engine, |sink| {
        FrameRequest::new(0, provider(&src), pool.clone(), sink).with_instruction(inst)
    });
    let outcome = rx.recv_timeout(WAIT).unwrap();

    // Both bad parameters are skipped; the catalog intensity (1.0) stands.
    assert_eq!(outcome.buffer().unwrap().pixel_rgba(0, 0), Some(expected_sepia(color, 1.0)));
}

#[test]
fn completions_arrive_in_submission_order() {
    let engine = engine();
    let src = source(8, 8, [50, 50, 50, 255]);
    let pool = Arc::new(BufferPool::new(8, 8, PixelFormat::Bgra8, 32));
    let track = sepia_track();
    let (tx, rx) = unbounded();

    for i in 0..20u64 {
        let tx = tx.clone();
        // Alternate filtered and passthrough frames so work per request varies.
        let t = if i % 2 == 0 { secs_to_ns(1.0) } else { secs_to_ns(7.0) } + i;
        engine.submit(
            FrameRequest::new(t, provider(&src), pool.clone(), move |outcome| {
                tx.send((i, outcome.is_rendered())).ok();
            })
            .with_track(track.clone())
            .with_default_track(TRACK),
        );
    }

    let order: Vec<u64> = (0..20)
        .map(|_| {
            let (i, rendered) = rx.recv_timeout(WAIT).unwrap();
            assert!(rendered);
            i
        })
        .collect();
    assert_eq!(order, (0..20).collect::<Vec<_>>());
}

#[test]
fn cancel_all_discards_queued_requests() {
    let engine = engine();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 8));

    // Hold the worker inside the first request's completion so that the
    // next five are guaranteed to still be queued.
    let (release_tx, release_rx) = bounded::<()>(0);
    let (started_tx, started_rx) = bounded::<()>(1);
    engine.submit(
        FrameRequest::new(0, provider(&src), pool.clone(), move |_| {
            started_tx.send(()).ok();
            release_rx.recv_timeout(WAIT).ok();
        })
        .with_default_track(TRACK),
    );
    started_rx.recv_timeout(WAIT).unwrap();

    let receivers: Vec<_> = (0..5)
        .map(|i| {
            submit(&engine, |sink| {
                FrameRequest::new(secs_to_ns(1.0) + i, provider(&src), pool.clone(), sink)
                    .with_track(sepia_track())
            })
        })
        .collect();
    engine.cancel_all();
    release_tx.send(()).unwrap();

    for rx in receivers {
        let outcome = rx.recv_timeout(WAIT).unwrap();
        assert!(!outcome.is_rendered());
        assert_eq!(outcome.failure(), Some(FailureReason::Cancelled));
    }
    assert_eq!(engine.stats().cancelled, 5);

    // Work submitted after the flush runs normally.
    let after = submit(&engine, |sink| {
        FrameRequest::new(0, provider(&src), pool.clone(), sink).with_default_track(TRACK)
    });
    assert!(after.recv_timeout(WAIT).unwrap().is_rendered());
}

#[test]
fn missing_source_and_routing_failures() {
    let engine = engine();
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 2));
    let empty: Arc<dyn SourceFrameProvider> = Arc::new(HashMap::<TrackId, FrameBuffer>::new());

    let no_route = submit(&engine, |sink| {
        FrameRequest::new(0, empty.clone(), pool.clone(), sink).with_track(Arc::new(InstructionTrack::empty()))
    });
    assert_eq!(no_route.recv_timeout(WAIT).unwrap().failure(), Some(FailureReason::RoutingUnavailable));

    let no_frame = submit(&engine, |sink| {
        FrameRequest::new(secs_to_ns(1.0), empty.clone(), pool.clone(), sink).with_track(sepia_track())
    });
    assert_eq!(
        no_frame.recv_timeout(WAIT).unwrap().failure(),
        Some(FailureReason::SourceFrameUnavailable)
    );

    let hinted = submit(&engine, |sink| {
        FrameRequest::new(0, empty.clone(), pool.clone(), sink).with_routing_hints(vec![TrackId(4)])
    });
    assert_eq!(
        hinted.recv_timeout(WAIT).unwrap().failure(),
        Some(FailureReason::SourceFrameUnavailable)
    );
    assert_eq!(engine.stats().failed, 3);
}

#[test]
fn exhausted_pool_reports_allocation_failure() {
    let engine = engine();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 1));
    let _held = pool.allocate().unwrap();

    let rx = submit(&engine, |sink| {
        FrameRequest::new(secs_to_ns(1.0), provider(&src), pool.clone(), sink).with_track(sepia_track())
    });
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap().failure(),
        Some(FailureReason::DestinationAllocationFailed)
    );
}

struct BrokenBackend;

impl RenderBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    fn instantiate(&self, name: &str) -> Option<Box<dyn FilterKernel>> {
        filters::instantiate(name)
    }

    fn rasterize(&mut self, _: &FilterableImage, _: &FrameBuffer, _: Bounds) -> bool {
        false
    }
}

struct BrokenFactory;

impl BackendFactory for BrokenFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    fn create(&self) -> FramefxResult<Box<dyn RenderBackend>> {
        Ok(Box::new(BrokenBackend))
    }
}

struct NoDevice;

impl BackendFactory for NoDevice {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    fn create(&self) -> FramefxResult<Box<dyn RenderBackend>> {
        Err(FramefxError::unsupported("no GPU"))
    }
}

#[test]
fn failed_render_falls_back_to_source_frame() {
    let engine = CompositionEngine::builder(Arc::new(FilterCatalog::builtin()))
        .hardware_backend(Arc::new(BrokenFactory))
        .build()
        .unwrap();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 2));

    let rx = submit(&engine, |sink| {
        FrameRequest::new(secs_to_ns(1.0), provider(&src), pool.clone(), sink).with_track(sepia_track())
    });
    let outcome = rx.recv_timeout(WAIT).unwrap();
    assert!(outcome.buffer().unwrap().ptr_eq(&src));
    assert_eq!(engine.stats().degraded, 1);
}

#[test]
fn hardware_failure_uses_software_backend() {
    let config = EngineConfig {
        backend: BackendPreference::Hardware,
        ..EngineConfig::default()
    };
    let engine = CompositionEngine::builder(Arc::new(FilterCatalog::builtin()))
        .config(config)
        .hardware_backend(Arc::new(NoDevice))
        .build()
        .unwrap();
    let color = [120, 90, 60, 255];
    let src = source(4, 4, color);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 2));

    let rx = submit(&engine, |sink| {
        FrameRequest::new(secs_to_ns(1.0), provider(&src), pool.clone(), sink).with_track(sepia_track())
    });
    let outcome = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(outcome.buffer().unwrap().pixel_rgba(1, 1), Some(expected_sepia(color, 0.8)));
}

#[test]
fn shutdown_drains_queued_work() {
    let engine = engine();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 8));
    let receivers: Vec<_> = (0..4)
        .map(|_| {
            submit(&engine, |sink| {
                FrameRequest::new(secs_to_ns(1.0), provider(&src), pool.clone(), sink).with_track(sepia_track())
            })
        })
        .collect();
    engine.shutdown();
    for rx in receivers {
        assert!(rx.try_recv().unwrap().is_rendered());
    }
}

#[tokio::test]
async fn completion_channel_works_from_async_callers() {
    let engine = engine();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 2));

    let (sink, rx) = completion_channel();
    engine.submit(FrameRequest::new(0, provider(&src), pool, sink).with_default_track(TRACK));
    let outcome = rx.await.unwrap();
    assert!(outcome.buffer().unwrap().ptr_eq(&src));
}

struct CountingFactory {
    kind: BackendKind,
    created: Arc<AtomicUsize>,
}

impl BackendFactory for CountingFactory {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn create(&self) -> FramefxResult<Box<dyn RenderBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        match self.kind {
            BackendKind::Hardware => Err(FramefxError::unsupported("no GPU")),
            BackendKind::Software => Ok(Box::new(SoftwareBackend::new())),
        }
    }
}

#[test]
fn rendering_context_is_built_once_on_first_filtered_frame() {
    let hardware_created = Arc::new(AtomicUsize::new(0));
    let software_created = Arc::new(AtomicUsize::new(0));
    let engine = CompositionEngine::builder(Arc::new(FilterCatalog::builtin()))
        .hardware_backend(Arc::new(CountingFactory {
            kind: BackendKind::Hardware,
            created: hardware_created.clone(),
        }))
        .software_backend(Arc::new(CountingFactory {
            kind: BackendKind::Software,
            created: software_created.clone(),
        }))
        .build()
        .unwrap();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 4));

    for i in 0..3 {
        let rx = submit(&engine, |sink| {
            FrameRequest::new(secs_to_ns(7.0) + i, provider(&src), pool.clone(), sink)
                .with_track(sepia_track())
                .with_default_track(TRACK)
        });
        assert!(rx.recv_timeout(WAIT).unwrap().buffer().unwrap().ptr_eq(&src));
    }
    assert_eq!(hardware_created.load(Ordering::SeqCst), 0);
    assert_eq!(software_created.load(Ordering::SeqCst), 0);

    for i in 0..4 {
        let rx = submit(&engine, |sink| {
            FrameRequest::new(secs_to_ns(1.0) + i, provider(&src), pool.clone(), sink)
                .with_track(sepia_track())
        });
        assert!(rx.recv_timeout(WAIT).unwrap().is_rendered());
    }
    assert_eq!(hardware_created.load(Ordering::SeqCst), 1);
    assert_eq!(software_created.load(Ordering::SeqCst), 1);
    assert_eq!(engine.stats().filtered, 4);
}

#[test]
fn panicking_sink_does_not_stop_the_worker() {
    let engine = engine();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 2));

    engine.submit(
        FrameRequest::new(0, provider(&src), pool.clone(), |_| panic!("sink failed"))
            .with_default_track(TRACK),
    );
    let rx = submit(&engine, |sink| {
        FrameRequest::new(0, provider(&src), pool.clone(), sink).with_default_track(TRACK)
    });

    assert!(rx.recv_timeout(WAIT).unwrap().buffer().unwrap().ptr_eq(&src));
}

struct PanickingProvider;

impl SourceFrameProvider for PanickingProvider {
    fn frame(&self, _: TrackId) -> Option<FrameBuffer> {
        panic!("decoder crashed")
    }

    fn track_ids(&self) -> Vec<TrackId> {
        Vec::new()
    }
}

#[test]
fn panicking_provider_completes_request_as_aborted() {
    let engine = engine();
    let src = source(4, 4, [9, 9, 9, 255]);
    let pool = Arc::new(BufferPool::new(4, 4, PixelFormat::Bgra8, 2));

    let crashed = submit(&engine, |sink| {
        FrameRequest::new(0, Arc::new(PanickingProvider), pool.clone(), sink)
            .with_default_track(TRACK)
    });
    let next = submit(&engine, |sink| {
        FrameRequest::new(0, provider(&src), pool.clone(), sink).with_default_track(TRACK)
    });

    assert_eq!(
        crashed.recv_timeout(WAIT).unwrap().failure(),
        Some(FailureReason::Aborted)
    );
    assert!(crashed.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(next.recv_timeout(WAIT).unwrap().is_rendered());
    assert_eq!(engine.stats().failed, 1);
}
