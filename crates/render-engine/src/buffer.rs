//! Frame buffers and destination allocators.
//!
//! A [`FrameBuffer`] is a cheap-clone handle: clones share the same backing
//! memory and the same [`BufferId`]. Passthrough hands the caller the very
//! handle it supplied, so identity is observable with [`FrameBuffer::ptr_eq`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Pixel layouts the pipeline can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit B, G, R, A (the usual decoder output).
    Bgra8,
    /// 8-bit R, G, B, A.
    Rgba8,
    /// 8-bit luma only.
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Bgra8 | Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }
}

/// Process-unique buffer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Errors from buffer construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("buffer dimensions must be non-zero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("row stride {bytes_per_row} is smaller than {min} bytes")]
    StrideTooSmall { bytes_per_row: usize, min: usize },

    #[error("pixel data is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("buffer size overflows")]
    Overflow,
}

struct BufferInner {
    id: BufferId,
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes_per_row: usize,
    pixels: RwLock<Vec<u8>>,
}

/// Handle to a decoded or rendered image buffer.
#[derive(Clone)]
pub struct FrameBuffer {
    inner: Arc<BufferInner>,
}

impl FrameBuffer {
    /// Allocate a zeroed, tightly packed buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, BufferError> {
        let bytes_per_row = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or(BufferError::Overflow)?;
        Self::with_stride(width, height, format, bytes_per_row)
    }

    /// Allocate a zeroed buffer with row padding.
    pub fn with_stride(
        width: u32,
        height: u32,
        format: PixelFormat,
        bytes_per_row: usize,
    ) -> Result<Self, BufferError> {
        let len = validate_layout(width, height, format, bytes_per_row)?;
        Ok(Self::from_parts(width, height, format, bytes_per_row, vec![0; len]))
    }

    /// Wrap existing pixel data. `pixels` must be exactly `bytes_per_row * height` long.
    pub fn from_pixels(
        width: u32,
        height: u32,
        format: PixelFormat,
        bytes_per_row: usize,
        pixels: Vec<u8>,
    ) -> Result<Self, BufferError> {
        let expected = validate_layout(width, height, format, bytes_per_row)?;
        if pixels.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self::from_parts(width, height, format, bytes_per_row, pixels))
    }

    fn from_parts(
        width: u32,
        height: u32,
        format: PixelFormat,
        bytes_per_row: usize,
        pixels: Vec<u8>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                id: BufferId::next(),
                width,
                height,
                format,
                bytes_per_row,
                pixels: RwLock::new(pixels),
            }),
        }
    }

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.inner.bytes_per_row
    }

    /// Whether both handles refer to the same backing buffer.
    pub fn ptr_eq(&self, other: &FrameBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.inner
            .pixels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.inner
            .pixels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fill every pixel with one straight-alpha RGBA color.
    pub fn fill(&self, rgba: [u8; 4]) {
        let (width, format, stride) = (self.width() as usize, self.format(), self.bytes_per_row());
        let bpp = format.bytes_per_pixel();
        let mut pixels = self.write();
        for row in pixels.chunks_exact_mut(stride) {
            for px in row[..width * bpp].chunks_exact_mut(bpp) {
                encode_pixel(format, rgba, px);
            }
        }
    }

    /// The pixel at `(x, y)` as straight-alpha RGBA, if in bounds.
    pub fn pixel_rgba(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let bpp = self.format().bytes_per_pixel();
        let offset = y as usize * self.bytes_per_row() + x as usize * bpp;
        let pixels = self.read();
        Some(decode_pixel(self.format(), &pixels[offset..offset + bpp]))
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("id", &self.inner.id)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("format", &self.inner.format)
            .field("bytes_per_row", &self.inner.bytes_per_row)
            .finish()
    }
}

fn validate_layout(
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes_per_row: usize,
) -> Result<usize, BufferError> {
    if width == 0 || height == 0 {
        return Err(BufferError::ZeroSize { width, height });
    }
    let min = (width as usize)
        .checked_mul(format.bytes_per_pixel())
        .ok_or(BufferError::Overflow)?;
    if bytes_per_row < min {
        return Err(BufferError::StrideTooSmall { bytes_per_row, min });
    }
    bytes_per_row
        .checked_mul(height as usize)
        .ok_or(BufferError::Overflow)
}

/// Decode one pixel into straight-alpha RGBA.
pub(crate) fn decode_pixel(format: PixelFormat, px: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Bgra8 => [px[2], px[1], px[0], px[3]],
        PixelFormat::Rgba8 => [px[0], px[1], px[2], px[3]],
        PixelFormat::Gray8 => [px[0], px[0], px[0], 255],
    }
}

/// Encode straight-alpha RGBA into one pixel.
pub(crate) fn encode_pixel(format: PixelFormat, rgba: [u8; 4], px: &mut [u8]) {
    match format {
        PixelFormat::Bgra8 => px.copy_from_slice(&[rgba[2], rgba[1], rgba[0], rgba[3]]),
        PixelFormat::Rgba8 => px.copy_from_slice(&rgba),
        PixelFormat::Gray8 => {
            let luma = 0.2126 * rgba[0] as f32 + 0.7152 * rgba[1] as f32 + 0.0722 * rgba[2] as f32;
            px[0] = luma.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Source of destination buffers for filtered frames.
///
/// Supplied by the playback/export side with each request; it fixes the
/// output dimensions and format.
pub trait DestinationAllocator: Send + Sync {
    /// Dimensions of the buffers this allocator hands out.
    fn target_size(&self) -> (u32, u32);

    /// A buffer of `target_size()`, or `None` if none can be produced.
    fn allocate(&self) -> Option<FrameBuffer>;
}

/// Allocation counters for a [`BufferPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Fresh buffers created.
    pub allocated: u64,
    /// Requests served by recycling a released buffer.
    pub reused: u64,
    /// Requests refused because the pool was exhausted.
    pub exhausted: u64,
}

/// Bounded pool of same-sized output buffers.
///
/// A retained buffer is recycled once every handle outside the pool has
/// been dropped. With `max_buffers` reached and nothing released,
/// `allocate` returns `None`.
pub struct BufferPool {
    width: u32,
    height: u32,
    format: PixelFormat,
    max_buffers: usize,
    retained: Mutex<Vec<FrameBuffer>>,
    allocated: AtomicU64,
    reused: AtomicU64,
    exhausted: AtomicU64,
}

impl BufferPool {
    pub fn new(width: u32, height: u32, format: PixelFormat, max_buffers: usize) -> Self {
        Self {
            width,
            height,
            format,
            max_buffers,
            retained: Mutex::new(Vec::new()),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl DestinationAllocator for BufferPool {
    fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn allocate(&self) -> Option<FrameBuffer> {
        let mut retained = self
            .retained
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Only the pool's own handle left: nobody else can observe the pixels.
        if let Some(free) = retained.iter().find(|buf| buf.handle_count() == 1) {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Some(free.clone());
        }

        if retained.len() >= self.max_buffers {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                max_buffers = self.max_buffers,
                "Buffer pool exhausted"
            );
            return None;
        }

        match FrameBuffer::new(self.width, self.height, self.format) {
            Ok(buffer) => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                retained.push(buffer.clone());
                Some(buffer)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to allocate destination buffer");
                None
            }
        }
    }
}
