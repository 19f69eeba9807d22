use super::{
    draw_shadow, modulate, shadow_extent, tint, visible_frame, DrawError, Drawable, LayerCanvas,
    RenderContext, RenderTarget,
};
use crate::effects;
use crate::layer::{Gradient, GradientKind, Layer, TextAlign, TextLayer};
use crate::layout::{Bounds, Placement};
use crate::placeholder::substitute;
use crate::text::{rasterize_line, TextRaster};
use tiny_skia::{
    GradientStop, LinearGradient, Paint, Pixmap, PixmapPaint, Point, RadialGradient, Rect, Shader,
    SpreadMode, Transform,
};

/// Gradient shader over a `w` x `h` box, mapped into the buffer by `to_buffer`.
fn gradient_shader(
    gradient: &Gradient,
    w: f32,
    h: f32,
    to_buffer: Transform,
) -> Option<Shader<'static>> {
    let mut stops = gradient.resolved_stops();
    stops.sort_by(|a, b| a.0.total_cmp(&b.0));
    let stops: Vec<GradientStop> = stops
        .into_iter()
        .map(|(offset, color)| GradientStop::new(offset, color.to_skia()))
        .collect();
    if stops.is_empty() {
        return None;
    }

    let (cx, cy) = (w / 2.0, h / 2.0);
    match gradient.kind {
        GradientKind::Linear => {
            let (sin, cos) = gradient.angle.to_radians().sin_cos();
            // Half the box's extent along the gradient direction.
            let half = ((w * cos).abs() + (h * sin).abs()) / 2.0;
            LinearGradient::new(
                Point::from_xy(cx - cos * half, cy - sin * half),
                Point::from_xy(cx + cos * half, cy + sin * half),
                stops,
                SpreadMode::Pad,
                to_buffer,
            )
        }
        GradientKind::Radial => RadialGradient::new(
            Point::from_xy(cx, cy),
            Point::from_xy(cx, cy),
            w.max(h) / 2.0,
            stops,
            SpreadMode::Pad,
            to_buffer,
        ),
    }
}

/// Copies `raster` into a `width * height` buffer at `(x, y)`, clipping.
fn place_coverage(raster: &TextRaster, width: usize, height: usize, x: i32, y: i32) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    for row in 0..raster.height {
        let dy = y + row as i32;
        if dy < 0 || dy as usize >= height {
            continue;
        }
        for col in 0..raster.width {
            let dx = x + col as i32;
            if dx < 0 || dx as usize >= width {
                continue;
            }
            out[dy as usize * width + dx as usize] = raster.coverage[row * raster.width + col];
        }
    }
    out
}

impl Drawable for TextLayer {
    fn draw(
        &self,
        layer: &Layer,
        placement: &Placement,
        ctx: &RenderContext<'_>,
        target: &mut dyn RenderTarget,
    ) -> Result<(), DrawError> {
        let style = &self.style;
        let content = substitute(&self.content, ctx.form);
        let n = &ctx.normalizer;
        let size = n.length(style.font_size);
        if content.trim().is_empty() || size <= 0.0 {
            tracing::debug!("Text layer {} has nothing to draw", layer.id);
            return Ok(());
        }

        let font = ctx
            .fonts
            .resolve(&style.font_family, style.font_weight)
            .ok_or_else(|| DrawError::NoFont(style.font_family.clone()))?;
        let raster = rasterize_line(font, &content, size, n.length(style.letter_spacing));

        let bounds = &placement.bounds;
        let pen_x = match style.align {
            TextAlign::Left => 0.0,
            TextAlign::Center => (bounds.width - raster.advance) / 2.0,
            TextAlign::Right => bounds.width - raster.advance,
        };
        let baseline_y = (bounds.height - raster.line_height()) / 2.0 + raster.ascent;

        let stroke_px = style
            .stroke
            .as_ref()
            .map_or(0.0, |s| n.length(s.width.max(0.0)));
        let ink = Bounds::new(
            bounds.x + pen_x - raster.origin_x as f32,
            bounds.y + baseline_y - raster.baseline as f32,
            raster.width as f32,
            raster.height as f32,
        );
        let pad = stroke_px.ceil() + shadow_extent(style.shadow.as_ref(), n) + 1.0;
        let visible = visible_frame(placement, n.surface(), pad);
        let mut canvas = LayerCanvas::new(bounds, &bounds.union(&ink).inflate(pad), &visible)?;
        let (w, h) = (canvas.width(), canvas.height());

        let x = (canvas.box_x + pen_x).round() as i32 - raster.origin_x;
        let y = (canvas.box_y + baseline_y).round() as i32 - raster.baseline;
        let fill = place_coverage(&raster, w, h, x, y);

        let outline = style.stroke.as_ref().filter(|_| stroke_px > 0.0).map(|stroke| {
            let mut coverage = fill.clone();
            effects::dilate(&mut coverage, w, h, stroke_px.round().max(1.0) as usize);
            (coverage, stroke.color)
        });

        if let Some(shadow) = &style.shadow {
            let silhouette = outline.as_ref().map_or(&fill, |(coverage, _)| coverage);
            draw_shadow(&mut canvas, silhouette, shadow, n);
        }

        // Stroke beneath fill.
        if let Some((coverage, color)) = &outline {
            if let Some(pixmap) = tint(coverage, w, h, *color) {
                canvas.pixmap.draw_pixmap(
                    0,
                    0,
                    pixmap.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
        }

        let shader = style
            .gradient
            .as_ref()
            .and_then(|g| gradient_shader(g, bounds.width, bounds.height, canvas.box_transform()));
        let body = match (shader, Rect::from_xywh(0.0, 0.0, w as f32, h as f32)) {
            (Some(shader), Some(rect)) => {
                let mut pixmap = Pixmap::new(w as u32, h as u32).ok_or(DrawError::Allocation {
                    width: w as u32,
                    height: h as u32,
                })?;
                let paint = Paint {
                    shader,
                    ..Paint::default()
                };
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                modulate(&mut pixmap, &fill);
                Some(pixmap)
            }
            _ => tint(&fill, w, h, style.color),
        };
        if let Some(body) = body {
            canvas.pixmap.draw_pixmap(
                0,
                0,
                body.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }

        target.draw_layer(placement, canvas.into_layer(1.0));
        Ok(())
    }
}
