//! The shared rendering context.
//!
//! Built once per engine, on first use, and reused for every frame. The
//! backend choice (hardware, else software) is made at construction and
//! never renegotiated per frame.

use framefx_common::config::BackendPreference;
use framefx_common::error::{FramefxError, FramefxResult};
use framefx_composition_model::params::ParamValue;

use crate::backend::{BackendFactory, BackendKind, RenderBackend, SoftwareBackend};
use crate::buffer::FrameBuffer;
use crate::filters::FilterKernel;
use crate::image::{Bounds, FilterableImage};

/// A filter instance bound to a backend kernel, with its input image.
pub struct Filter {
    kernel: Box<dyn FilterKernel>,
    input: Option<FilterableImage>,
}

impl Filter {
    pub fn name(&self) -> &'static str {
        self.kernel.name()
    }

    pub fn set_input(&mut self, image: FilterableImage) {
        self.input = Some(image);
    }

    /// Evaluate the filter. `None` without an input or when the kernel
    /// produces nothing.
    pub fn output_image(&self) -> Option<FilterableImage> {
        let input = self.input.as_ref()?;
        self.kernel.apply(input).filter(|out| !out.is_empty())
    }
}

/// Reusable handle to one rendering backend.
pub struct RenderingContext {
    backend: Box<dyn RenderBackend>,
}

impl RenderingContext {
    /// Construct a context, preferring hardware when asked for and
    /// available, falling back to `software`.
    ///
    /// Fails only if every candidate backend fails to construct.
    pub fn build(
        preference: BackendPreference,
        hardware: Option<&dyn BackendFactory>,
        software: &dyn BackendFactory,
    ) -> FramefxResult<Self> {
        let mut failures = Vec::new();

        if preference == BackendPreference::Hardware {
            match hardware {
                Some(factory) => match factory.create() {
                    Ok(backend) => {
                        tracing::info!(backend = backend.name(), kind = %factory.kind(), "Rendering context using hardware backend");
                        return Ok(Self { backend });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Hardware backend unavailable, falling back to software");
                        failures.push(format!("hardware: {e}"));
                    }
                },
                None => {
                    tracing::debug!("No hardware backend registered, using software");
                }
            }
        }

        match software.create() {
            Ok(backend) => {
                tracing::info!(backend = backend.name(), kind = %software.kind(), "Rendering context using software backend");
                Ok(Self { backend })
            }
            Err(e) => {
                failures.push(format!("software: {e}"));
                Err(FramefxError::render(format!(
                    "no rendering backend could be constructed ({})",
                    failures.join("; ")
                )))
            }
        }
    }

    /// A context over the built-in software backend.
    pub fn software() -> Self {
        Self {
            backend: Box::new(SoftwareBackend::new()),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Wrap a buffer as a filterable image.
    pub fn create_filterable(&self, buffer: &FrameBuffer) -> FilterableImage {
        FilterableImage::from_buffer(buffer)
    }

    /// Instantiate a backend filter by name. `None` if the backend doesn't
    /// know it; callers should degrade, not fail.
    pub fn instantiate_filter(&self, name: &str) -> Option<Filter> {
        self.backend.instantiate(name).map(|kernel| Filter {
            kernel,
            input: None,
        })
    }

    /// Bind one parameter, best-effort. An unsupported name or type is
    /// logged and skipped; returns whether the value was applied.
    pub fn set_parameter(&self, filter: &mut Filter, name: &str, value: &ParamValue) -> bool {
        match filter.kernel.set_parameter(name, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(filter = filter.name(), parameter = name, error = %e, "Skipping filter parameter");
                false
            }
        }
    }

    /// Rasterize `image` into `dest` within `bounds`.
    pub fn render(&mut self, image: &FilterableImage, dest: &FrameBuffer, bounds: Bounds) -> bool {
        self.backend.rasterize(image, dest, bounds)
    }
}

impl std::fmt::Debug for RenderingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderingContext")
            .field("backend", &self.backend.name())
            .field("kind", &self.backend.kind())
            .finish()
    }
}
