use super::{
    rounded_rect, visible_frame, DrawError, Drawable, LayerCanvas, RenderContext, RenderTarget,
};
use crate::layer::{Layer, ShapeGeometry, ShapeLayer};
use crate::layout::Placement;
use tiny_skia::{FillRule, LineCap, Paint, PathBuilder, Rect, Stroke};

impl Drawable for ShapeLayer {
    fn draw(
        &self,
        layer: &Layer,
        placement: &Placement,
        ctx: &RenderContext<'_>,
        target: &mut dyn RenderTarget,
    ) -> Result<(), DrawError> {
        let style = &self.style;
        let bounds = &placement.bounds;
        let stroke_width = ctx.normalizer.length(style.stroke_width.max(0.0));
        let pad = stroke_width / 2.0 + 1.0;
        let visible = visible_frame(placement, ctx.normalizer.surface(), pad);
        let mut canvas = LayerCanvas::padded(bounds, pad, &visible)?;
        let transform = canvas.box_transform();
        let (w, h) = (bounds.width, bounds.height);

        let path = match style.geometry {
            ShapeGeometry::Rectangle => {
                rounded_rect(0.0, 0.0, w, h, ctx.normalizer.length(style.corner_radius))
            }
            ShapeGeometry::Circle => Rect::from_xywh(0.0, 0.0, w, h).and_then(PathBuilder::from_oval),
            ShapeGeometry::Line => {
                let mut pb = PathBuilder::new();
                pb.move_to(0.0, h / 2.0);
                pb.line_to(w, h / 2.0);
                pb.finish()
            }
        };
        let Some(path) = path else {
            tracing::debug!("Shape layer {} has an empty path", layer.id);
            return Ok(());
        };

        let mut paint = Paint {
            anti_alias: true,
            ..Paint::default()
        };

        if style.geometry == ShapeGeometry::Line {
            // A line has no interior; its color comes from stroke, else fill.
            if let Some(color) = style.stroke.or(style.fill) {
                paint.set_color(color.to_skia());
                let stroke = Stroke {
                    width: stroke_width.max(1.0),
                    line_cap: LineCap::Butt,
                    ..Stroke::default()
                };
                canvas.pixmap.stroke_path(&path, &paint, &stroke, transform, None);
            }
        } else {
            if let Some(fill) = style.fill {
                paint.set_color(fill.to_skia());
                canvas.pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
            }
            if let Some(color) = style.stroke {
                if stroke_width > 0.0 {
                    paint.set_color(color.to_skia());
                    let stroke = Stroke {
                        width: stroke_width,
                        ..Stroke::default()
                    };
                    canvas.pixmap.stroke_path(&path, &paint, &stroke, transform, None);
                }
            }
        }

        target.draw_layer(placement, canvas.into_layer(style.opacity));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::assets::ImageCache;
    use crate::color::Color;
    use crate::layer::{Layer, LayerId, LayerKind, ShapeGeometry, Size};
    use crate::placeholder::FormData;
    use crate::render::{compose, RasterTarget, RenderContext};
    use crate::scene::{Background, Scene};
    use crate::text::FontBook;
    use crate::DefaultAssetLoader;
    use std::sync::Arc;

    fn render(layer: Layer) -> RasterTarget {
        let scene = Scene::new(Background::new("", 200, 200)).with_layers(vec![layer]);
        let normalizer = scene.normalizer(200.0).unwrap();
        let images = ImageCache::new(Arc::new(DefaultAssetLoader));
        let form = FormData::new();
        let fonts = FontBook::default();
        let ctx = RenderContext::new(normalizer, &form, &images, &fonts);
        let mut target = RasterTarget::new(normalizer.surface()).unwrap();
        compose(&scene, &ctx, &mut target).unwrap();
        target
    }

    fn shape(geometry: ShapeGeometry, fill: Option<Color>, stroke: Option<Color>) -> Layer {
        // 500 reference units at scale 0.2 is a 100 px box centered at (100, 100).
        let mut layer = Layer::shape(LayerId(1), geometry).sized(Size::new(500.0, 500.0));
        if let LayerKind::Shape(s) = &mut layer.kind {
            s.style.fill = fill;
            s.style.stroke = stroke;
            s.style.stroke_width = 10.0;
        }
        layer
    }

    fn rgb(target: &RasterTarget, x: u32, y: u32) -> (u8, u8, u8) {
        let px = target.pixmap().pixel(x, y).unwrap();
        (px.red(), px.green(), px.blue())
    }

    #[test]
    fn circle_leaves_corners_empty() {
        let target = render(shape(ShapeGeometry::Circle, Some(Color::rgb(0, 0, 255)), None));
        assert_eq!(rgb(&target, 100, 100), (0, 0, 255));
        assert_eq!(rgb(&target, 53, 53), (255, 255, 255));
    }

    #[test]
    fn rectangle_stroke_is_drawn_over_fill() {
        let target = render(shape(
            ShapeGeometry::Rectangle,
            Some(Color::rgb(0, 255, 0)),
            Some(Color::rgb(255, 0, 0)),
        ));
        assert_eq!(rgb(&target, 100, 100), (0, 255, 0));
        assert_eq!(rgb(&target, 100, 50), (255, 0, 0));
    }

    #[test]
    fn line_falls_back_to_fill_color() {
        let target = render(shape(ShapeGeometry::Line, Some(Color::rgb(0, 0, 0)), None));
        assert_eq!(rgb(&target, 100, 100), (0, 0, 0));
        assert_eq!(rgb(&target, 100, 90), (255, 255, 255));
    }
}
