use super::{
    draw_shadow, rounded_rect, shadow_extent, visible_frame, DrawError, Drawable, LayerCanvas,
    RenderContext, RenderTarget,
};
use crate::effects;
use crate::layer::{ImageLayer, Layer};
use crate::layout::{Bounds, Placement};
use tiny_skia::{
    FillRule, FilterQuality, Paint, Pattern, Pixmap, PixmapPaint, SpreadMode, Stroke, Transform,
};

impl Drawable for ImageLayer {
    fn draw(
        &self,
        layer: &Layer,
        placement: &Placement,
        ctx: &RenderContext<'_>,
        target: &mut dyn RenderTarget,
    ) -> Result<(), DrawError> {
        let style = &self.style;
        let source = ctx.image(&self.source)?;
        let bounds = &placement.bounds;
        let n = &ctx.normalizer;

        if source.width() == 0 || source.height() == 0 || bounds.width <= 0.0 || bounds.height <= 0.0 {
            tracing::debug!("Image layer {} has no area", layer.id);
            return Ok(());
        }

        let border_width = style
            .border
            .as_ref()
            .map_or(0.0, |b| n.length(b.width.max(0.0)));
        let pad = shadow_extent(style.shadow.as_ref(), n).max(border_width / 2.0 + 1.0);
        let visible = visible_frame(placement, n.surface(), pad);

        // Only the part of the box that can reach the surface is resampled,
        // with room for the blur to read past the edge.
        let blur = n.length(style.blur_radius.max(0.0));
        let reach = visible
            .inflate(blur * 2.0 + 1.0)
            .translated(-bounds.x, -bounds.y);
        let Some(window) = Bounds::new(0.0, 0.0, bounds.width, bounds.height).intersect(&reach) else {
            tracing::debug!("Image layer {} is off the surface", layer.id);
            return Ok(());
        };
        let cx0 = window.x.floor();
        let cy0 = window.y.floor();
        let content_w = (window.right().ceil() - cx0).max(1.0) as u32;
        let content_h = (window.bottom().ceil() - cy0).max(1.0) as u32;

        // Resample into box space; the cached image itself is never touched.
        let mut content = Pixmap::new(content_w, content_h).ok_or(DrawError::Allocation {
            width: content_w,
            height: content_h,
        })?;
        let sx = bounds.width / source.width() as f32;
        let sy = bounds.height / source.height() as f32;
        let mut fit = Transform::from_scale(sx, sy);
        if style.flip_x {
            fit = fit.post_concat(Transform::from_row(-1.0, 0.0, 0.0, 1.0, bounds.width, 0.0));
        }
        if style.flip_y {
            fit = fit.post_concat(Transform::from_row(1.0, 0.0, 0.0, -1.0, 0.0, bounds.height));
        }
        fit = fit.post_concat(Transform::from_translate(-cx0, -cy0));
        let resample = PixmapPaint {
            quality: FilterQuality::Bicubic,
            ..PixmapPaint::default()
        };
        content.draw_pixmap(0, 0, Pixmap::as_ref(&source), &resample, fit, None);
        effects::apply_filter(&mut content, style.filter, blur);

        let mut canvas = LayerCanvas::padded(bounds, pad, &visible)?;
        let transform = canvas.box_transform();

        let Some(clip) = rounded_rect(
            0.0,
            0.0,
            bounds.width,
            bounds.height,
            n.length(style.corner_radius),
        ) else {
            return Ok(());
        };

        let mut body = Pixmap::new(canvas.pixmap.width(), canvas.pixmap.height()).ok_or(
            DrawError::Allocation {
                width: canvas.pixmap.width(),
                height: canvas.pixmap.height(),
            },
        )?;
        let paint = Paint {
            shader: Pattern::new(
                content.as_ref(),
                SpreadMode::Pad,
                FilterQuality::Nearest,
                1.0,
                Transform::from_translate(cx0, cy0),
            ),
            anti_alias: true,
            ..Paint::default()
        };
        body.fill_path(&clip, &paint, FillRule::Winding, transform, None);

        if let Some(shadow) = &style.shadow {
            let silhouette = effects::alpha_of(&body);
            draw_shadow(&mut canvas, &silhouette, shadow, n);
        }
        canvas.pixmap.draw_pixmap(
            0,
            0,
            body.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );

        if let Some(border) = &style.border {
            if border_width > 0.0 {
                let mut paint = Paint {
                    anti_alias: true,
                    ..Paint::default()
                };
                paint.set_color(border.color.to_skia());
                let stroke = Stroke {
                    width: border_width,
                    ..Stroke::default()
                };
                canvas.pixmap.stroke_path(&clip, &paint, &stroke, transform, None);
            }
        }

        target.draw_layer(placement, canvas.into_layer(style.opacity));
        Ok(())
    }
}
