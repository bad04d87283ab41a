//! Raster surfaces
//!
//! A surface is the pixel buffer a page is painted into plus the size it is
//! presented at. Raster pixels scale with the device pixel ratio while the
//! presented size stays equal to the layout width, so density never changes
//! layout.

use crate::engine::Raster;

/// Pixel buffer owned by one page
#[derive(Clone, PartialEq)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    css_width: f32,
    css_height: f32,
    pixels: Vec<u8>,
}

impl RasterSurface {
    /// Build a surface from a finished raster presented at `css_width`.
    pub fn from_raster(raster: Raster, css_width: f32, aspect: f64) -> Self {
        Self {
            width: raster.width,
            height: raster.height,
            css_width,
            css_height: (css_width as f64 * aspect) as f32,
            pixels: raster.pixels,
        }
    }

    /// Raster width in device pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Raster height in device pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Presented (layout) width
    pub fn css_width(&self) -> f32 {
        self.css_width
    }

    /// Presented (layout) height
    pub fn css_height(&self) -> f32 {
        self.css_height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes held by the pixel buffer
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Stretch factor needed to show this raster at `layout_width`.
    ///
    /// 1.0 means the raster is sharp for the current layout; anything else
    /// is a transform that lasts until the next render settles.
    pub fn display_scale(&self, layout_width: f32) -> f32 {
        if self.css_width <= 0.0 {
            return 1.0;
        }
        layout_width / self.css_width
    }
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("css_width", &self.css_width)
            .field("css_height", &self.css_height)
            .finish()
    }
}
