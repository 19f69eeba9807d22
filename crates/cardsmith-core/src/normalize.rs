//! # Coordinate Normalizer
//!
//! The only conversion boundary between stored (resolution-independent)
//! coordinates and pixels on a concrete surface.
//!
//! ## Contract
//! - Positions are stored as percentages `p` of the canvas and map to
//!   `p / 100 * W` horizontally and `p / 100 * H` vertically.
//! - Lengths are stored at reference scale `L` and draw at `L * W / R`,
//!   where `R` is the scene's reference width.
//!
//! The preview at any zoom and the batch raster at any output resolution
//! both go through this type, so a layer's relative geometry is identical on
//! every surface.

use crate::error::{RenderError, SceneError};
use serde::{Deserialize, Serialize};

fn fifty() -> f32 {
    50.0
}

/// A point in percent of canvas width/height (the persisted form).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentPoint {
    #[serde(default = "fifty")]
    pub x: f32,
    #[serde(default = "fifty")]
    pub y: f32,
}

impl PercentPoint {
    pub const CENTER: PercentPoint = PercentPoint { x: 50.0, y: 50.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl Default for PercentPoint {
    fn default() -> Self {
        Self::CENTER
    }
}

/// A point in pixels of the surface currently being drawn or edited.
///
/// Never persisted; always re-derived from a [`PercentPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

impl PixelPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions of a drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Surface {
    pub width: f32,
    pub height: f32,
}

impl Surface {
    pub fn new(width: f32, height: f32) -> Result<Self, RenderError> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) {
            return Err(RenderError::InvalidSurface { width, height });
        }
        Ok(Self { width, height })
    }

    /// A surface `target_width` pixels wide with the template's aspect ratio.
    pub fn for_template(
        template_width: u32,
        template_height: u32,
        target_width: f32,
    ) -> Result<Self, RenderError> {
        if template_width == 0 || template_height == 0 {
            return Err(SceneError::InvalidTemplateSize {
                width: template_width,
                height: template_height,
            }
            .into());
        }
        let height = target_width * template_height as f32 / template_width as f32;
        Self::new(target_width, height)
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(self.width / 2.0, self.height / 2.0)
    }

    /// Whole-pixel dimensions for allocating a raster buffer.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    reference_width: f32,
    surface: Surface,
}

impl Normalizer {
    pub fn new(reference_width: f32, surface: Surface) -> Result<Self, RenderError> {
        if !reference_width.is_finite() || reference_width <= 0.0 {
            return Err(SceneError::InvalidReferenceWidth(reference_width).into());
        }
        Ok(Self {
            reference_width,
            surface,
        })
    }

    pub fn reference_width(&self) -> f32 {
        self.reference_width
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// `W / R`: multiplier applied to every reference-scale length.
    pub fn scale(&self) -> f32 {
        self.surface.width / self.reference_width
    }

    pub fn to_pixels(&self, point: PercentPoint) -> PixelPoint {
        PixelPoint::new(
            point.x / 100.0 * self.surface.width,
            point.y / 100.0 * self.surface.height,
        )
    }

    pub fn to_percent(&self, point: PixelPoint) -> PercentPoint {
        PercentPoint::new(
            point.x / self.surface.width * 100.0,
            point.y / self.surface.height * 100.0,
        )
    }

    /// Reference-scale length to surface pixels.
    pub fn length(&self, reference: f32) -> f32 {
        reference * self.scale()
    }

    /// Surface pixels back to a reference-scale length.
    pub fn to_reference(&self, pixels: f32) -> f32 {
        pixels / self.scale()
    }

    /// A displacement given in reference units, expressed in percent.
    pub fn reference_delta_percent(&self, dx: f32, dy: f32) -> (f32, f32) {
        let px = self.length(dx) / self.surface.width * 100.0;
        let py = self.length(dy) / self.surface.height * 100.0;
        (px, py)
    }
}
