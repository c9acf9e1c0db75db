//! Render one frame of a still image through an instruction track.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use framefx_common::clock::secs_to_ns;
use framefx_common::config::AppConfig;
use framefx_composition_model::{InstructionTrack, TrackId};
use framefx_render_engine::{
    completion_channel, BufferPool, CompositionEngine, FrameBuffer, FrameRequest, PixelFormat,
    RenderOutcome, SourceFrameProvider,
};

pub async fn run(
    config: &AppConfig,
    track_path: PathBuf,
    input: PathBuf,
    at: f64,
    output: PathBuf,
    track_id: u32,
    catalog: Option<PathBuf>,
) -> anyhow::Result<()> {
    let track = InstructionTrack::load(&track_path)
        .map_err(|e| anyhow::anyhow!("Failed to load track: {e}"))?;
    let catalog = super::load_catalog(config, catalog)?;

    let decoded = image::open(&input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", input.display()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    let source = FrameBuffer::from_pixels(
        width,
        height,
        PixelFormat::Rgba8,
        width as usize * PixelFormat::Rgba8.bytes_per_pixel(),
        decoded.into_raw(),
    )?;

    let track_id = TrackId(track_id);
    let timestamp_ns = secs_to_ns(at);
    if let Some(instruction) = track.lookup(timestamp_ns) {
        println!(
            "Active instruction: {} {} {}",
            instruction.time_range,
            instruction.source_track_id,
            instruction.filter().unwrap_or("(passthrough)")
        );
    } else {
        println!("No instruction covers {at:.3}s; frame passes through");
    }

    let mut frames = HashMap::new();
    frames.insert(track_id, source.clone());
    let sources: Arc<dyn SourceFrameProvider> = Arc::new(frames);
    let pool = Arc::new(BufferPool::new(width, height, PixelFormat::Rgba8, 2));

    let engine = CompositionEngine::new(config.engine.clone(), Arc::new(catalog))?;
    let (sink, done) = completion_channel();
    engine.submit(
        FrameRequest::new(timestamp_ns, sources, pool, sink)
            .with_track(Arc::new(track))
            .with_default_track(track_id),
    );

    let frame = match done.await? {
        RenderOutcome::Rendered(frame) => frame,
        RenderOutcome::Failed(reason) => anyhow::bail!("Render failed: {reason}"),
    };
    let stats = engine.stats();
    engine.shutdown();

    let image = image::RgbaImage::from_fn(frame.width(), frame.height(), |x, y| {
        image::Rgba(frame.pixel_rgba(x, y).unwrap_or([0, 0, 0, 0]))
    });
    image
        .save(&output)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", output.display()))?;

    let how = if frame.ptr_eq(&source) {
        "unchanged"
    } else if stats.degraded > 0 {
        "unfiltered (filter could not be applied)"
    } else {
        "filtered"
    };
    println!("Wrote {}x{} frame to {} ({how})", frame.width(), frame.height(), output.display());
    tracing::debug!(?stats, "Render complete");

    Ok(())
}
