//! Software filter kernels.
//!
//! Each kernel owns its parameter values; the rendering context binds
//! parameters one at a time and then evaluates the kernel against an
//! input image. Kernel names are what catalog entries refer to as
//! `backend_name`.

use framefx_composition_model::params::{ParamValue, Point2D, Rgba};

use crate::image::{FilterableImage, Rgbaf};

/// Why a parameter could not be bound.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("filter {filter} has no parameter {name:?}")]
    Unknown { filter: &'static str, name: String },

    #[error("parameter {name:?} expects a {expected}, got a {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("parameter {name:?} is not finite")]
    NotFinite { name: String },
}

/// A named, parameterized image operation.
pub trait FilterKernel: Send {
    /// Backend name of this kernel.
    fn name(&self) -> &'static str;

    /// Bind one parameter. Unsupported names or types are errors; the
    /// kernel keeps its previous value.
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError>;

    /// Evaluate the kernel. `None` means no output could be produced.
    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage>;
}

/// Names of every kernel [`instantiate`] knows.
pub const KERNEL_NAMES: &[&str] = &[
    "sepia_tone",
    "color_monochrome",
    "photo_noir",
    "color_invert",
    "color_controls",
    "exposure_adjust",
    "vignette",
    "gamma_adjust",
];

/// Create a kernel with its built-in defaults, or `None` for an unknown name.
pub fn instantiate(name: &str) -> Option<Box<dyn FilterKernel>> {
    let kernel: Box<dyn FilterKernel> = match name {
        "sepia_tone" => Box::new(SepiaTone { intensity: 1.0 }),
        "color_monochrome" => Box::new(ColorMonochrome {
            color: Rgba::new(0.6, 0.45, 0.3, 1.0),
            intensity: 1.0,
        }),
        "photo_noir" => Box::new(PhotoNoir),
        "color_invert" => Box::new(ColorInvert),
        "color_controls" => Box::new(ColorControls {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
        }),
        "exposure_adjust" => Box::new(ExposureAdjust { ev: 0.0 }),
        "vignette" => Box::new(Vignette {
            intensity: 0.0,
            radius: 1.0,
            center: Point2D::new(0.5, 0.5),
        }),
        "gamma_adjust" => Box::new(GammaAdjust { power: 1.0 }),
        _ => return None,
    };
    Some(kernel)
}

fn number(name: &str, value: &ParamValue) -> Result<f32, ParameterError> {
    let v = value.as_number().ok_or_else(|| ParameterError::TypeMismatch {
        name: name.to_string(),
        expected: "number",
        found: value.kind(),
    })?;
    if !v.is_finite() {
        return Err(ParameterError::NotFinite {
            name: name.to_string(),
        });
    }
    Ok(v as f32)
}

fn color(name: &str, value: &ParamValue) -> Result<Rgba, ParameterError> {
    value.as_color().ok_or_else(|| ParameterError::TypeMismatch {
        name: name.to_string(),
        expected: "color",
        found: value.kind(),
    })
}

fn point(name: &str, value: &ParamValue) -> Result<Point2D, ParameterError> {
    value.as_point().ok_or_else(|| ParameterError::TypeMismatch {
        name: name.to_string(),
        expected: "point",
        found: value.kind(),
    })
}

fn unknown(filter: &'static str, name: &str) -> ParameterError {
    ParameterError::Unknown {
        filter,
        name: name.to_string(),
    }
}

fn luma(px: Rgbaf) -> f32 {
    0.2126 * px[0] + 0.7152 * px[1] + 0.0722 * px[2]
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Warm brown toning blended with the original by `intensity`.
pub struct SepiaTone {
    intensity: f32,
}

impl SepiaTone {
    pub fn tone(px: Rgbaf) -> [f32; 3] {
        let [r, g, b, _] = px;
        [
            clamp01(0.393 * r + 0.769 * g + 0.189 * b),
            clamp01(0.349 * r + 0.686 * g + 0.168 * b),
            clamp01(0.272 * r + 0.534 * g + 0.131 * b),
        ]
    }
}

impl FilterKernel for SepiaTone {
    fn name(&self) -> &'static str {
        "sepia_tone"
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "intensity" => self.intensity = clamp01(number(name, value)?),
            _ => return Err(unknown(self.name(), name)),
        }
        Ok(())
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        let t = self.intensity;
        Some(input.map_pixels(|_, _, px| {
            let [sr, sg, sb] = Self::tone(px);
            [mix(px[0], sr, t), mix(px[1], sg, t), mix(px[2], sb, t), px[3]]
        }))
    }
}

/// Luma remapped onto a single tint color.
pub struct ColorMonochrome {
    color: Rgba,
    intensity: f32,
}

impl FilterKernel for ColorMonochrome {
    fn name(&self) -> &'static str {
        "color_monochrome"
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "color" => self.color = color(name, value)?,
            "intensity" => self.intensity = clamp01(number(name, value)?),
            _ => return Err(unknown(self.name(), name)),
        }
        Ok(())
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        let (c, t) = (self.color, self.intensity);
        Some(input.map_pixels(|_, _, px| {
            let l = luma(px);
            [
                mix(px[0], clamp01(l * c.r * 2.0), t),
                mix(px[1], clamp01(l * c.g * 2.0), t),
                mix(px[2], clamp01(l * c.b * 2.0), t),
                px[3],
            ]
        }))
    }
}

/// High-contrast black and white.
pub struct PhotoNoir;

impl FilterKernel for PhotoNoir {
    fn name(&self) -> &'static str {
        "photo_noir"
    }

    fn set_parameter(&mut self, name: &str, _value: &ParamValue) -> Result<(), ParameterError> {
        Err(unknown(self.name(), name))
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        Some(input.map_pixels(|_, _, px| {
            let l = clamp01((luma(px) - 0.5) * 1.35 + 0.5);
            [l, l, l, px[3]]
        }))
    }
}

pub struct ColorInvert;

impl FilterKernel for ColorInvert {
    fn name(&self) -> &'static str {
        "color_invert"
    }

    fn set_parameter(&mut self, name: &str, _value: &ParamValue) -> Result<(), ParameterError> {
        Err(unknown(self.name(), name))
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        Some(input.map_pixels(|_, _, px| [1.0 - px[0], 1.0 - px[1], 1.0 - px[2], px[3]]))
    }
}

/// Saturation, then brightness offset, then contrast around mid-gray.
pub struct ColorControls {
    brightness: f32,
    contrast: f32,
    saturation: f32,
}

impl FilterKernel for ColorControls {
    fn name(&self) -> &'static str {
        "color_controls"
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "brightness" => self.brightness = number(name, value)?.clamp(-1.0, 1.0),
            "contrast" => self.contrast = number(name, value)?.clamp(0.0, 4.0),
            "saturation" => self.saturation = number(name, value)?.clamp(0.0, 4.0),
            _ => return Err(unknown(self.name(), name)),
        }
        Ok(())
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        let (b, c, s) = (self.brightness, self.contrast, self.saturation);
        Some(input.map_pixels(|_, _, px| {
            let l = luma(px);
            let adjust = |v: f32| clamp01((mix(l, v, s) + b - 0.5) * c + 0.5);
            [adjust(px[0]), adjust(px[1]), adjust(px[2]), px[3]]
        }))
    }
}

/// Multiplies color by `2^ev`.
pub struct ExposureAdjust {
    ev: f32,
}

impl FilterKernel for ExposureAdjust {
    fn name(&self) -> &'static str {
        "exposure_adjust"
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "ev" => self.ev = number(name, value)?.clamp(-10.0, 10.0),
            _ => return Err(unknown(self.name(), name)),
        }
        Ok(())
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        let gain = 2f32.powf(self.ev);
        Some(input.map_pixels(|_, _, px| {
            [
                clamp01(px[0] * gain),
                clamp01(px[1] * gain),
                clamp01(px[2] * gain),
                px[3],
            ]
        }))
    }
}

/// Darkens toward the edges. `radius` is where falloff begins, as a
/// fraction of the center-to-corner distance.
pub struct Vignette {
    intensity: f32,
    radius: f32,
    center: Point2D,
}

impl FilterKernel for Vignette {
    fn name(&self) -> &'static str {
        "vignette"
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "intensity" => self.intensity = clamp01(number(name, value)?),
            "radius" => self.radius = clamp01(number(name, value)?),
            "center" => self.center = point(name, value)?,
            _ => return Err(unknown(self.name(), name)),
        }
        Ok(())
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        let (w, h) = (input.width().max(1) as f64, input.height().max(1) as f64);
        let reach = std::f64::consts::FRAC_1_SQRT_2;
        let span = (1.0 - self.radius).max(1e-3);
        Some(input.map_pixels(|x, y, px| {
            let pos = Point2D::new((x as f64 + 0.5) / w, (y as f64 + 0.5) / h);
            let d = (pos.distance_to(&self.center) / reach) as f32;
            let v = clamp01((d - self.radius) / span);
            let factor = 1.0 - self.intensity * v * v;
            [px[0] * factor, px[1] * factor, px[2] * factor, px[3]]
        }))
    }
}

/// Raises each channel to `power`.
pub struct GammaAdjust {
    power: f32,
}

impl FilterKernel for GammaAdjust {
    fn name(&self) -> &'static str {
        "gamma_adjust"
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "power" => self.power = number(name, value)?.clamp(0.05, 10.0),
            _ => return Err(unknown(self.name(), name)),
        }
        Ok(())
    }

    fn apply(&self, input: &FilterableImage) -> Option<FilterableImage> {
        let p = self.power;
        Some(input.map_pixels(|_, _, px| {
            [
                clamp01(px[0]).powf(p),
                clamp01(px[1]).powf(p),
                clamp01(px[2]).powf(p),
                px[3],
            ]
        }))
    }
}
