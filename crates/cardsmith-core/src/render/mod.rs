//! # Compositor
//!
//! Draws a [`Scene`] onto a [`RenderTarget`].
//!
//! ## Responsibilities
//! - **Paint order**: background and layers in stable `(z_index, list
//!   position)` order; invisible layers skipped.
//! - **Drawables**: one [`Drawable`] implementation per layer kind. Each
//!   renders its layer into a local [`LayerPixmap`] in unrotated box space;
//!   the target composites it with the layer's rotation.
//! - **Degradation**: a layer that fails to draw becomes a
//!   [`RenderWarning`] and is skipped; a missing background falls back to the
//!   last good image or a flat color.
//!
//! ## Targets
//! - [`PreviewTarget`]: on-screen zoom, plus chrome (grid, guides,
//!   selection, placeholder boxes) and hit testing.
//! - [`RasterTarget`]: full output resolution, no chrome, encodes to PNG/JPEG.
//!
//! Both targets share [`Canvas`] for content, and every position comes from
//! [`resolve`] through the scene's [`Normalizer`], so content pixels agree
//! for the same surface.

mod bitmap;
mod preview;
mod raster;
mod shape;
mod text;

pub use preview::{Chrome, PreviewTarget, Placeholder};
pub use raster::{RasterTarget, MAX_OUTPUT_DIMENSION, MAX_OUTPUT_PIXELS};

use crate::assets::ImageCache;
use crate::batch::CancelToken;
use crate::color::Color;
use crate::effects;
use crate::error::{AssetError, RenderError};
use crate::layer::{Layer, LayerId, LayerKind, Shadow};
use crate::layout::{resolve, Bounds, Placement};
use crate::normalize::{Normalizer, Surface};
use crate::placeholder::FormData;
use crate::scene::{Background, PaintItem, Scene};
use crate::text::FontBook;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tiny_skia::{FilterQuality, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Transform};

/// Why a single layer could not be drawn. Never aborts a composition.
#[derive(Debug, Error)]
pub enum DrawError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Asset '{0}' is still loading")]
    Pending(String),

    #[error("No font available for '{0}'")]
    NoFont(String),

    #[error("Cannot allocate a {width}x{height} layer buffer")]
    Allocation { width: u32, height: u32 },
}

/// How drawables obtain images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAccess {
    /// Load on demand (batch).
    Blocking,
    /// Use only what is already cached; anything else is pending (editor).
    CachedOnly,
}

/// Everything a drawable needs besides its layer.
pub struct RenderContext<'a> {
    pub normalizer: Normalizer,
    pub form: &'a FormData,
    pub images: &'a ImageCache,
    pub fonts: &'a FontBook,
    pub access: ImageAccess,
    pub fallback_color: Color,
    pub last_good_background: Option<Arc<Pixmap>>,
    pub cancel: Option<&'a CancelToken>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        normalizer: Normalizer,
        form: &'a FormData,
        images: &'a ImageCache,
        fonts: &'a FontBook,
    ) -> Self {
        Self {
            normalizer,
            form,
            images,
            fonts,
            access: ImageAccess::Blocking,
            fallback_color: Color::WHITE,
            last_good_background: None,
            cancel: None,
        }
    }

    pub fn with_access(mut self, access: ImageAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_fallback_color(mut self, color: Color) -> Self {
        self.fallback_color = color;
        self
    }

    pub fn with_last_good_background(mut self, image: Option<Arc<Pixmap>>) -> Self {
        self.last_good_background = image;
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.is_cancelled())
    }

    pub fn image(&self, source: &str) -> Result<Arc<Pixmap>, DrawError> {
        match self.access {
            ImageAccess::Blocking => Ok(self.images.load(source)?),
            ImageAccess::CachedOnly => match self.images.get(source) {
                Some(entry) => Ok(entry?),
                None => Err(DrawError::Pending(source.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderWarning {
    /// `None` for the background.
    pub layer: Option<LayerId>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderReport {
    /// Placements of the visible layers, back to front.
    pub placements: Vec<Placement>,
    pub warnings: Vec<RenderWarning>,
}

impl RenderReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, layer: Option<LayerId>, message: String) {
        self.warnings.push(RenderWarning { layer, message });
    }
}

/// A layer rendered in its own unrotated frame, ready to composite.
pub struct LayerPixmap {
    pub pixmap: Pixmap,
    /// Surface position of the pixmap's top-left pixel before rotation.
    pub left: i32,
    pub top: i32,
    pub opacity: f32,
}

/// Scratch buffer a drawable paints one layer into.
///
/// Aligned to whole surface pixels so unrotated layers composite without
/// resampling. Local drawing uses box coordinates via [`LayerCanvas::box_transform`].
pub struct LayerCanvas {
    pub pixmap: Pixmap,
    pub left: i32,
    pub top: i32,
    /// Layout box origin inside the pixmap.
    pub box_x: f32,
    pub box_y: f32,
}

impl LayerCanvas {
    /// A buffer covering `region` (surface pixels) for a layer laid out at
    /// `layout`, clipped to `visible`.
    ///
    /// `box_x`/`box_y` stay relative to the clipped origin, so drawing in box
    /// coordinates lands where it would on an unclipped buffer.
    pub fn new(layout: &Bounds, region: &Bounds, visible: &Bounds) -> Result<Self, DrawError> {
        let region = region
            .intersect(visible)
            .unwrap_or_else(|| Bounds::new(visible.x, visible.y, 0.0, 0.0));
        let left = region.x.floor();
        let top = region.y.floor();
        let width = ((region.right().ceil() - left).max(1.0)) as u32;
        let height = ((region.bottom().ceil() - top).max(1.0)) as u32;
        if width as u64 * height as u64 > MAX_OUTPUT_PIXELS {
            return Err(DrawError::Allocation { width, height });
        }
        let pixmap = Pixmap::new(width, height).ok_or(DrawError::Allocation { width, height })?;
        Ok(Self {
            pixmap,
            left: left as i32,
            top: top as i32,
            box_x: layout.x - left,
            box_y: layout.y - top,
        })
    }

    /// A buffer covering `layout` grown by `pad` pixels on every side.
    pub fn padded(layout: &Bounds, pad: f32, visible: &Bounds) -> Result<Self, DrawError> {
        Self::new(layout, &layout.inflate(pad.max(0.0)), visible)
    }

    pub fn box_transform(&self) -> Transform {
        Transform::from_translate(self.box_x, self.box_y)
    }

    pub fn width(&self) -> usize {
        self.pixmap.width() as usize
    }

    pub fn height(&self) -> usize {
        self.pixmap.height() as usize
    }

    pub fn into_layer(self, opacity: f32) -> LayerPixmap {
        LayerPixmap {
            pixmap: self.pixmap,
            left: self.left,
            top: self.top,
            opacity: opacity.clamp(0.0, 1.0),
        }
    }
}

/// The part of the layer's unrotated frame that can reach the surface,
/// grown by `margin` so blurs and shadows near the edge keep their inputs.
pub(crate) fn visible_frame(placement: &Placement, surface: Surface, margin: f32) -> Bounds {
    let frame = Bounds::new(0.0, 0.0, surface.width, surface.height);
    if placement.rotation == 0.0 {
        return frame.inflate(margin.max(0.0));
    }
    let c = placement.bounds.center();
    let mut corners = [
        tiny_skia::Point::from_xy(frame.x, frame.y),
        tiny_skia::Point::from_xy(frame.right(), frame.y),
        tiny_skia::Point::from_xy(frame.right(), frame.bottom()),
        tiny_skia::Point::from_xy(frame.x, frame.bottom()),
    ];
    Transform::from_rotate_at(-placement.rotation, c.x, c.y).map_points(&mut corners);
    let (mut x0, mut y0) = (f32::INFINITY, f32::INFINITY);
    let (mut x1, mut y1) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in corners {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Bounds::new(x0, y0, x1 - x0, y1 - y0).inflate(margin.max(0.0))
}

/// A backend the compositor draws into.
pub trait RenderTarget {
    fn surface(&self) -> Surface;

    /// Draws the full-bleed background, or `fallback` when there is no image.
    fn draw_background(&mut self, image: Option<&Pixmap>, fallback: Color);

    /// Called for every visible layer before it is drawn.
    fn layer_placed(&mut self, _placement: &Placement) {}

    fn draw_layer(&mut self, placement: &Placement, layer: LayerPixmap);

    /// Called after a layer failed to draw.
    fn layer_failed(&mut self, _placement: &Placement, _error: &DrawError) {}
}

/// Draws one layer kind.
pub trait Drawable {
    fn draw(
        &self,
        layer: &Layer,
        placement: &Placement,
        ctx: &RenderContext<'_>,
        target: &mut dyn RenderTarget,
    ) -> Result<(), DrawError>;
}

impl Drawable for LayerKind {
    fn draw(
        &self,
        layer: &Layer,
        placement: &Placement,
        ctx: &RenderContext<'_>,
        target: &mut dyn RenderTarget,
    ) -> Result<(), DrawError> {
        match self {
            LayerKind::Text(text) => text.draw(layer, placement, ctx, target),
            LayerKind::Image(image) => image.draw(layer, placement, ctx, target),
            LayerKind::Shape(shape) => shape.draw(layer, placement, ctx, target),
        }
    }
}

/// Content surface shared by both targets.
pub struct Canvas {
    pixmap: Pixmap,
    surface: Surface,
}

impl Canvas {
    pub fn new(surface: Surface) -> Result<Self, RenderError> {
        let (width, height) = surface.pixel_size();
        let pixmap = Pixmap::new(width, height).ok_or(RenderError::OutputTooLarge { width, height })?;
        Ok(Self { pixmap, surface })
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    pub fn draw_background(&mut self, image: Option<&Pixmap>, fallback: Color) {
        match image {
            Some(image) if image.width() > 0 && image.height() > 0 => {
                let transform = Transform::from_scale(
                    self.surface.width / image.width() as f32,
                    self.surface.height / image.height() as f32,
                );
                let paint = PixmapPaint {
                    quality: FilterQuality::Bicubic,
                    ..PixmapPaint::default()
                };
                self.pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
            }
            _ => {
                if let Some(rect) = Rect::from_xywh(0.0, 0.0, self.surface.width, self.surface.height) {
                    let mut paint = tiny_skia::Paint::default();
                    paint.set_color(fallback.to_skia());
                    self.pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                }
            }
        }
    }

    pub fn draw_layer(&mut self, placement: &Placement, layer: &LayerPixmap) {
        let center = placement.bounds.center();
        let transform = Transform::from_translate(layer.left as f32, layer.top as f32)
            .post_concat(Transform::from_rotate_at(placement.rotation, center.x, center.y));
        let quality = if placement.rotation == 0.0 {
            FilterQuality::Nearest
        } else {
            FilterQuality::Bilinear
        };
        let paint = PixmapPaint {
            opacity: layer.opacity,
            quality,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(0, 0, layer.pixmap.as_ref(), &paint, transform, None);
    }
}

fn background_image(
    background: &Background,
    ctx: &RenderContext<'_>,
    report: &mut RenderReport,
) -> Option<Arc<Pixmap>> {
    if background.source.is_empty() {
        return ctx.last_good_background.clone();
    }
    match ctx.image(&background.source) {
        Ok(image) => Some(image),
        Err(DrawError::Pending(source)) => {
            tracing::debug!("Background '{}' not loaded yet", source);
            ctx.last_good_background.clone()
        }
        Err(err) => {
            tracing::warn!("Background unavailable, using fallback: {}", err);
            report.warn(None, format!("Background unavailable: {}", err));
            ctx.last_good_background.clone()
        }
    }
}

/// Composes `scene` onto `target`, back to front.
///
/// Per-layer failures are recorded in the report and never stop the
/// composition. Only cancellation is an error.
pub fn compose(
    scene: &Scene,
    ctx: &RenderContext<'_>,
    target: &mut dyn RenderTarget,
) -> Result<RenderReport, RenderError> {
    let mut report = RenderReport::default();

    for item in scene.paint_order() {
        if ctx.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        match item {
            PaintItem::Background(background) => {
                let image = background_image(background, ctx, &mut report);
                target.draw_background(image.as_deref(), ctx.fallback_color);
            }
            PaintItem::Layer(layer) if layer.visible => {
                let placement = resolve(layer, &ctx.normalizer);
                report.placements.push(placement);
                target.layer_placed(&placement);
                if let Err(err) = layer.kind.draw(layer, &placement, ctx, target) {
                    match &err {
                        DrawError::Pending(_) => tracing::debug!("Layer {}: {}", layer.id, err),
                        _ => {
                            tracing::warn!("Skipping layer {} ({}): {}", layer.id, layer.kind_name(), err);
                            report.warn(Some(layer.id), err.to_string());
                        }
                    }
                    target.layer_failed(&placement, &err);
                }
            }
            PaintItem::Layer(_) => {}
        }
    }

    Ok(report)
}

/// Rectangle path with circular corners of radius `r` (clamped to fit).
pub(crate) fn rounded_rect(x: f32, y: f32, w: f32, h: f32, r: f32) -> Option<Path> {
    let r = r.min(w / 2.0).min(h / 2.0).max(0.0);
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(Rect::from_xywh(x, y, w, h)?));
    }
    // Cubic approximation of a quarter circle.
    let k = 0.552_284_8 * r;
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Pixmap of `color` with per-pixel alpha scaled by `coverage`.
pub(crate) fn tint(coverage: &[u8], width: usize, height: usize, color: Color) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(width as u32, height as u32)?;
    let a = color.a as u32;
    let premul = [
        color.r as u32 * a / 255,
        color.g as u32 * a / 255,
        color.b as u32 * a / 255,
        a,
    ];
    for (px, &cov) in pixmap.data_mut().chunks_exact_mut(4).zip(coverage) {
        if cov == 0 {
            continue;
        }
        for (dst, channel) in px.iter_mut().zip(premul) {
            *dst = ((channel * cov as u32 + 127) / 255) as u8;
        }
    }
    Some(pixmap)
}

/// Scales every channel of `pixmap` by `coverage`.
pub(crate) fn modulate(pixmap: &mut Pixmap, coverage: &[u8]) {
    for (px, &cov) in pixmap.data_mut().chunks_exact_mut(4).zip(coverage) {
        for channel in px.iter_mut() {
            *channel = ((*channel as u32 * cov as u32 + 127) / 255) as u8;
        }
    }
}

/// Pixels a shadow can reach beyond the silhouette.
pub(crate) fn shadow_extent(shadow: Option<&Shadow>, normalizer: &Normalizer) -> f32 {
    shadow.map_or(0.0, |s| {
        let offset = normalizer.length(s.offset_x.abs().max(s.offset_y.abs()));
        offset + normalizer.length(s.blur.max(0.0)) * 2.0 + 1.0
    })
}

/// Draws the blurred, offset shadow of `silhouette` (canvas-sized coverage).
pub(crate) fn draw_shadow(
    canvas: &mut LayerCanvas,
    silhouette: &[u8],
    shadow: &Shadow,
    normalizer: &Normalizer,
) {
    let (w, h) = (canvas.width(), canvas.height());
    let mut coverage = silhouette.to_vec();
    effects::box_blur(
        &mut coverage,
        w,
        h,
        1,
        effects::blur_radius_px(normalizer.length(shadow.blur)),
    );
    let Some(shade) = tint(&coverage, w, h, shadow.color) else {
        return;
    };
    let dx = normalizer.length(shadow.offset_x).round() as i32;
    let dy = normalizer.length(shadow.offset_y).round() as i32;
    canvas.pixmap.draw_pixmap(
        dx,
        dy,
        shade.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}
