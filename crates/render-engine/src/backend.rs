//! Rendering backends.
//!
//! A backend knows a set of filter kernels and how to rasterize a working
//! image into a frame buffer. Hardware backends are provided by the host
//! through a [`BackendFactory`]; the software backend is always available.

use std::fmt;

use framefx_common::error::FramefxResult;

use crate::buffer::FrameBuffer;
use crate::filters::{self, FilterKernel};
use crate::image::{Bounds, FilterableImage};

/// Broad class of a rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Hardware,
    Software,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Software => write!(f, "software"),
        }
    }
}

/// An image-rendering backend.
///
/// Not required to be `Sync`: a backend is only ever driven from the
/// engine's render worker.
pub trait RenderBackend: Send {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Create the named kernel, or `None` if this backend doesn't know it.
    fn instantiate(&self, name: &str) -> Option<Box<dyn FilterKernel>>;

    /// Rasterize `image` into `dest` within `bounds`.
    fn rasterize(&mut self, image: &FilterableImage, dest: &FrameBuffer, bounds: Bounds) -> bool;
}

/// Constructs a backend. Construction may be expensive and may fail
/// (for example when no GPU device is present).
pub trait BackendFactory: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn create(&self) -> FramefxResult<Box<dyn RenderBackend>>;
}

/// CPU rasterizer over the built-in software kernels.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn instantiate(&self, name: &str) -> Option<Box<dyn FilterKernel>> {
        filters::instantiate(name)
    }

    fn rasterize(&mut self, image: &FilterableImage, dest: &FrameBuffer, bounds: Bounds) -> bool {
        image.rasterize_into(dest, bounds)
    }
}

/// Factory for [`SoftwareBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareBackendFactory;

impl BackendFactory for SoftwareBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn create(&self) -> FramefxResult<Box<dyn RenderBackend>> {
        Ok(Box::new(SoftwareBackend::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;

    #[test]
    fn test_software_backend_rasterizes() {
        let mut backend = SoftwareBackendFactory.create().unwrap();
        assert_eq!(backend.kind(), BackendKind::Software);

        let dest = FrameBuffer::new(2, 2, PixelFormat::Bgra8).unwrap();
        let image = FilterableImage::solid(2, 2, [0.0, 1.0, 0.0, 1.0]);
        assert!(backend.rasterize(&image, &dest, Bounds::of(&dest)));
        assert_eq!(dest.pixel_rgba(0, 1), Some([0, 255, 0, 255]));
    }

    #[test]
    fn test_software_backend_knows_kernels() {
        let backend = SoftwareBackend::new();
        assert!(backend.instantiate("sepia_tone").is_some());
        assert!(backend.instantiate("CISepiaTone").is_none());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(BackendKind::Hardware.to_string(), "hardware");
    }
}
