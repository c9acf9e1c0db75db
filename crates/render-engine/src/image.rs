//! Filterable working images.

use crate::buffer::{decode_pixel, encode_pixel, FrameBuffer};

/// Straight-alpha RGBA color with `f32` channels in `[0.0, 1.0]`.
pub type Rgbaf = [f32; 4];

/// Pixel rectangle in destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of `buffer`.
    pub fn of(buffer: &FrameBuffer) -> Self {
        Self::new(0, 0, buffer.width(), buffer.height())
    }

    /// Intersection with `[0, width) x [0, height)`, or `None` if empty.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Bounds> {
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);
        (self.x < x1 && self.y < y1).then(|| Bounds::new(self.x, self.y, x1 - self.x, y1 - self.y))
    }
}

/// A decoded image that filters read and produce.
///
/// Always a private copy: filtering never touches the source buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterableImage {
    width: u32,
    height: u32,
    pixels: Vec<Rgbaf>,
}

impl FilterableImage {
    /// Decode a buffer, honoring its row stride and format.
    pub fn from_buffer(buffer: &FrameBuffer) -> Self {
        let (width, height) = (buffer.width(), buffer.height());
        let format = buffer.format();
        let bpp = format.bytes_per_pixel();
        let stride = buffer.bytes_per_row();

        let data = buffer.read();
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in data.chunks_exact(stride).take(height as usize) {
            for px in row[..width as usize * bpp].chunks_exact(bpp) {
                let [r, g, b, a] = decode_pixel(format, px);
                pixels.push([unit(r), unit(g), unit(b), unit(a)]);
            }
        }

        Self {
            width,
            height,
            pixels,
        }
    }

    /// A solid-color image.
    pub fn solid(width: u32, height: u32, color: Rgbaf) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgbaf> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// A new image with `f(x, y, pixel)` applied to every pixel.
    pub fn map_pixels<F>(&self, mut f: F) -> FilterableImage
    where
        F: FnMut(u32, u32, Rgbaf) -> Rgbaf,
    {
        let width = self.width.max(1) as usize;
        let pixels = self
            .pixels
            .iter()
            .enumerate()
            .map(|(i, &px)| f((i % width) as u32, (i / width) as u32, px))
            .collect();
        Self {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    /// Write this image into `dest` within `bounds`.
    ///
    /// Destination pixels inside the clipped bounds that the image does
    /// not cover are cleared to transparent. Returns `false` when nothing
    /// could be written (empty image or bounds outside the buffer).
    pub fn rasterize_into(&self, dest: &FrameBuffer, bounds: Bounds) -> bool {
        if self.is_empty() {
            return false;
        }
        let Some(clip) = bounds.clip_to(dest.width(), dest.height()) else {
            return false;
        };

        let format = dest.format();
        let bpp = format.bytes_per_pixel();
        let stride = dest.bytes_per_row();
        let mut data = dest.write();

        for y in clip.y..clip.y + clip.height {
            let row_start = y as usize * stride;
            for x in clip.x..clip.x + clip.width {
                // Image space is relative to the bounds origin.
                let src = self.pixel(x - bounds.x, y - bounds.y);
                let rgba = src.map_or([0, 0, 0, 0], quantize);
                let offset = row_start + x as usize * bpp;
                encode_pixel(format, rgba, &mut data[offset..offset + bpp]);
            }
        }
        true
    }
}

fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

fn quantize(px: Rgbaf) -> [u8; 4] {
    px.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}
