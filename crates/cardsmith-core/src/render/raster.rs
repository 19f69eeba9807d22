use super::{Canvas, DrawError, LayerPixmap, RenderTarget};
use crate::color::Color;
use crate::config::{OutputFormat, QualityTier};
use crate::error::RenderError;
use crate::layout::Placement;
use crate::normalize::Surface;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use tiny_skia::Pixmap;

/// Largest output side in pixels.
pub const MAX_OUTPUT_DIMENSION: u32 = 16_384;
/// Largest output area in pixels.
pub const MAX_OUTPUT_PIXELS: u64 = 120_000_000;

pub(crate) fn check_output_size(width: u32, height: u32) -> Result<(), RenderError> {
    if width > MAX_OUTPUT_DIMENSION
        || height > MAX_OUTPUT_DIMENSION
        || width as u64 * height as u64 > MAX_OUTPUT_PIXELS
    {
        return Err(RenderError::OutputTooLarge { width, height });
    }
    Ok(())
}

/// Off-screen target for exported files. Draws content only.
pub struct RasterTarget {
    canvas: Canvas,
}

impl RasterTarget {
    /// Allocates the output buffer, refusing sizes beyond the output limits.
    pub fn new(surface: Surface) -> Result<Self, RenderError> {
        let (width, height) = surface.pixel_size();
        check_output_size(width, height)?;
        Ok(Self {
            canvas: Canvas::new(surface)?,
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        self.canvas.pixmap()
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.canvas.into_pixmap()
    }

    /// Straight-alpha RGBA copy of the output.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let pixmap = self.canvas.pixmap();
        let mut data = Vec::with_capacity(pixmap.data().len());
        for px in pixmap.pixels() {
            let c = px.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
            .unwrap_or_else(|| RgbaImage::new(pixmap.width(), pixmap.height()))
    }

    /// RGB copy composited over `matte`, for formats without alpha.
    fn to_rgb_over(&self, matte: Color) -> Vec<u8> {
        let pixmap = self.canvas.pixmap();
        let mut data = Vec::with_capacity(pixmap.pixels().len() * 3);
        for px in pixmap.pixels() {
            let inv = 255 - px.alpha() as u32;
            for (channel, back) in [(px.red(), matte.r), (px.green(), matte.g), (px.blue(), matte.b)] {
                data.push((channel as u32 + (back as u32 * inv + 127) / 255).min(255) as u8);
            }
        }
        data
    }

    pub fn encode(&self, format: OutputFormat, quality: QualityTier) -> Result<Vec<u8>, RenderError> {
        let (width, height) = (self.canvas.pixmap().width(), self.canvas.pixmap().height());
        let mut out = Vec::new();
        let result = match format {
            OutputFormat::Png => {
                let rgba = self.to_rgba_image();
                PngEncoder::new(&mut out).write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
            }
            OutputFormat::Jpeg => {
                let rgb = self.to_rgb_over(Color::WHITE);
                JpegEncoder::new_with_quality(&mut out, quality.jpeg_quality())
                    .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
            }
        };
        result.map_err(|e| RenderError::Encode(e.to_string()))?;
        tracing::debug!("Encoded {}x{} {:?} ({} bytes)", width, height, format, out.len());
        Ok(out)
    }
}

impl RenderTarget for RasterTarget {
    fn surface(&self) -> Surface {
        self.canvas.surface()
    }

    fn draw_background(&mut self, image: Option<&Pixmap>, fallback: Color) {
        self.canvas.draw_background(image, fallback);
    }

    fn draw_layer(&mut self, placement: &Placement, layer: LayerPixmap) {
        self.canvas.draw_layer(placement, &layer);
    }

    fn layer_failed(&mut self, placement: &Placement, error: &DrawError) {
        tracing::debug!("Raster output omits layer {}: {}", placement.id, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_oversized_outputs() {
        let huge = Surface::new(20_000.0, 100.0).unwrap();
        assert!(matches!(
            RasterTarget::new(huge),
            Err(RenderError::OutputTooLarge { width: 20_000, .. })
        ));
        let area = Surface::new(12_000.0, 12_000.0).unwrap();
        assert!(matches!(RasterTarget::new(area), Err(RenderError::OutputTooLarge { .. })));
    }

    #[test]
    fn encodes_png_and_jpeg() {
        let mut target = RasterTarget::new(Surface::new(8.0, 4.0).unwrap()).unwrap();
        target.draw_background(None, Color::rgb(10, 20, 30));

        let png = target.encode(OutputFormat::Png, QualityTier::Low).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert_eq!(decoded.get_pixel(3, 2).0, [10, 20, 30, 255]);

        let jpeg = target.encode(OutputFormat::Jpeg, QualityTier::Ultra).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn jpeg_flattens_transparency_over_white() {
        let target = RasterTarget::new(Surface::new(2.0, 2.0).unwrap()).unwrap();
        assert!(target.to_rgb_over(Color::WHITE).iter().all(|&v| v == 255));
    }
}
