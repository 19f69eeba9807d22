//! # Layout
//!
//! Resolves a layer to pixel geometry on a concrete surface.
//!
//! [`resolve`] is the single function both render targets, the snap engine
//! and the hit tester use. Two calls with the same layer, reference width and
//! target width return the same [`Placement`], whatever the caller.

use crate::layer::{Layer, LayerId, LayerKind, TextAlign};
use crate::normalize::{Normalizer, PixelPoint};
use crate::scene::Scene;
use serde::Serialize;

/// Text box height as a multiple of the font size.
pub const LINE_HEIGHT: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

/// Axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centered(center: PixelPoint, width: f32, height: f32) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: PixelPoint) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// `[start, center, end]` along `axis`.
    pub fn edges(&self, axis: Axis) -> [f32; 3] {
        match axis {
            Axis::X => [self.x, self.x + self.width / 2.0, self.right()],
            Axis::Y => [self.y, self.y + self.height / 2.0, self.bottom()],
        }
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grown by `pad` on every side.
    pub fn inflate(&self, pad: f32) -> Self {
        Self::new(
            self.x - pad,
            self.y - pad,
            self.width + 2.0 * pad,
            self.height + 2.0 * pad,
        )
    }

    pub fn union(&self, other: &Bounds) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    /// Overlap of two boxes; `None` when they do not overlap.
    pub fn intersect(&self, other: &Bounds) -> Option<Self> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| Self::new(x, y, right - x, bottom - y))
    }
}

/// Resolved pixel geometry of one layer on one surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub id: LayerId,
    /// The layer's position in pixels (the alignment anchor for text).
    pub anchor: PixelPoint,
    /// Unrotated layout box.
    pub bounds: Bounds,
    /// Degrees about `bounds.center()`.
    pub rotation: f32,
}

impl Placement {
    /// Rotation-aware point containment.
    pub fn contains(&self, p: PixelPoint) -> bool {
        if self.rotation == 0.0 {
            return self.bounds.contains(p);
        }
        let c = self.bounds.center();
        let (sin, cos) = (-self.rotation.to_radians()).sin_cos();
        let dx = p.x - c.x;
        let dy = p.y - c.y;
        let local = PixelPoint::new(c.x + dx * cos - dy * sin, c.y + dx * sin + dy * cos);
        self.bounds.contains(local)
    }

    /// The same placement with its anchor moved to `anchor`.
    pub fn moved_to(&self, anchor: PixelPoint) -> Self {
        let dx = anchor.x - self.anchor.x;
        let dy = anchor.y - self.anchor.y;
        Self {
            anchor,
            bounds: self.bounds.translated(dx, dy),
            ..*self
        }
    }
}

/// Horizontal extent `[left, right]` of a text box of `width` anchored at
/// `x` with the given alignment.
pub fn text_extent(x: f32, width: f32, align: TextAlign) -> (f32, f32) {
    match align {
        TextAlign::Left => (x, x + width),
        TextAlign::Right => (x - width, x),
        TextAlign::Center => (x - width / 2.0, x + width / 2.0),
    }
}

pub fn resolve(layer: &Layer, normalizer: &Normalizer) -> Placement {
    let anchor = normalizer.to_pixels(layer.position);

    let bounds = match &layer.kind {
        LayerKind::Text(text) => {
            let style = &text.style;
            let wrap = if style.max_width > 0.0 {
                style.max_width
            } else {
                layer.size.width
            };
            let width = normalizer.length(wrap.max(0.0));
            let height = if layer.size.height > 0.0 {
                normalizer.length(layer.size.height)
            } else {
                normalizer.length(style.font_size.max(0.0) * LINE_HEIGHT)
            };
            let (left, _) = text_extent(anchor.x, width, style.align);
            Bounds::new(left, anchor.y - height / 2.0, width, height)
        }
        LayerKind::Image(image) => {
            let factor = if image.style.scale > 0.0 {
                image.style.scale
            } else {
                1.0
            };
            Bounds::centered(
                anchor,
                normalizer.length(layer.size.width.max(0.0) * factor),
                normalizer.length(layer.size.height.max(0.0) * factor),
            )
        }
        LayerKind::Shape(_) => Bounds::centered(
            anchor,
            normalizer.length(layer.size.width.max(0.0)),
            normalizer.length(layer.size.height.max(0.0)),
        ),
    };

    Placement {
        id: layer.id,
        anchor,
        bounds,
        rotation: layer.rotation,
    }
}

/// Placements of the visible layers, back to front.
pub fn resolve_scene(scene: &Scene, normalizer: &Normalizer) -> Vec<Placement> {
    scene
        .visible_layers()
        .into_iter()
        .map(|layer| resolve(layer, normalizer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerKind, ShapeGeometry, Size};
    use crate::normalize::{PercentPoint, Surface};

    fn normalizer(width: f32) -> Normalizer {
        Normalizer::new(1000.0, Surface::new(width, width * 0.7).unwrap()).unwrap()
    }

    fn centered_text(max_width: f32) -> Layer {
        let mut layer = Layer::text(LayerId(1), "Name").at(PercentPoint::new(50.0, 50.0));
        if let LayerKind::Text(text) = &mut layer.kind {
            text.style.max_width = max_width;
            text.style.align = TextAlign::Center;
        }
        layer
    }

    #[test]
    fn intersect_clips_or_rejects() {
        let a = Bounds::new(0.0, 0.0, 100.0, 50.0);
        let b = Bounds::new(-20.0, 10.0, 60.0, 500.0);
        assert_eq!(a.intersect(&b), Some(Bounds::new(0.0, 10.0, 40.0, 40.0)));
        assert_eq!(a.intersect(&Bounds::new(100.0, 0.0, 10.0, 10.0)), None);
    }

    #[test]
    fn centered_text_at_double_scale() {
        let placement = resolve(&centered_text(200.0), &normalizer(2000.0));
        assert_eq!(placement.anchor.x, 1000.0);
        assert_eq!(placement.bounds.x, 800.0);
        assert_eq!(placement.bounds.right(), 1200.0);
        assert_eq!(placement.bounds.center().x, 1000.0);
    }

    #[test]
    fn text_alignment_moves_the_box_not_the_anchor() {
        let n = normalizer(1000.0);
        let mut layer = centered_text(200.0).at(PercentPoint::new(40.0, 50.0));
        let mut extents = Vec::new();
        for align in [TextAlign::Left, TextAlign::Center, TextAlign::Right] {
            if let LayerKind::Text(text) = &mut layer.kind {
                text.style.align = align;
            }
            let p = resolve(&layer, &n);
            assert_eq!(p.anchor.x, 400.0);
            extents.push((p.bounds.x, p.bounds.right()));
        }
        assert_eq!(extents, vec![(400.0, 600.0), (300.0, 500.0), (200.0, 400.0)]);
    }

    #[test]
    fn relative_geometry_is_scale_invariant() {
        let layer = Layer::image(LayerId(2), "seal.png")
            .at(PercentPoint::new(12.5, 80.0))
            .sized(Size::new(180.0, 120.0));
        let a = resolve(&layer, &normalizer(800.0));
        let b = resolve(&layer, &normalizer(3200.0));
        let rel = |p: &Placement, w: f32| {
            let h = w * 0.7;
            [p.bounds.x / w, p.bounds.y / h, p.bounds.width / w, p.bounds.height / h]
        };
        for (x, y) in rel(&a, 800.0).iter().zip(rel(&b, 3200.0).iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn rotated_containment() {
        let layer = Layer::shape(LayerId(3), ShapeGeometry::Rectangle)
            .at(PercentPoint::new(50.0, 50.0))
            .sized(Size::new(400.0, 20.0))
            .rotated(90.0);
        let p = resolve(&layer, &normalizer(1000.0));
        // The long axis now runs vertically through the center (500, 350).
        assert!(p.contains(PixelPoint::new(500.0, 350.0 + 150.0)));
        assert!(!p.contains(PixelPoint::new(500.0 + 150.0, 350.0)));
    }
}
