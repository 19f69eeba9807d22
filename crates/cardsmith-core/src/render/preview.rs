use super::raster::check_output_size;
use super::{tint, Canvas, DrawError, LayerPixmap, RenderTarget};
use crate::color::Color;
use crate::error::RenderError;
use crate::layer::{FontWeight, LayerId};
use crate::layout::{Axis, Placement};
use crate::normalize::{PixelPoint, Surface};
use crate::snap::{Guideline, SnapClass};
use crate::text::{rasterize_line, FontBook};
use tiny_skia::{Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, StrokeDash, Transform};

const GRID_COLOR: Color = Color::rgba(0, 0, 0, 28);
const SELECTION_COLOR: Color = Color::rgb(30, 144, 255);
const PLACEHOLDER_FILL: Color = Color::rgba(200, 200, 200, 110);
const PLACEHOLDER_INK: Color = Color::rgb(190, 40, 40);
const LABEL_SIZE: f32 = 12.0;
const HANDLE_SIZE: f32 = 6.0;

fn guide_color(class: SnapClass) -> Color {
    match class {
        SnapClass::CanvasCenter => Color::rgb(255, 0, 128),
        SnapClass::LayerCenter => Color::rgb(0, 170, 255),
        SnapClass::LayerEdge => Color::rgb(0, 200, 120),
        SnapClass::SelfEdge => Color::rgb(255, 170, 0),
        SnapClass::Grid => Color::rgba(120, 120, 120, 200),
    }
}

/// Editor overlays drawn on top of the content.
#[derive(Debug, Clone, Default)]
pub struct Chrome {
    pub selection: Option<LayerId>,
    pub guides: Vec<Guideline>,
    /// Grid spacing in preview pixels.
    pub grid: Option<f32>,
}

/// A layer that could not be drawn and is shown as a labelled box instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub placement: Placement,
    pub label: String,
}

fn placeholder_label(error: &DrawError) -> &'static str {
    match error {
        DrawError::Pending(_) => "Loading",
        DrawError::Asset(_) => "Missing image",
        DrawError::NoFont(_) => "Font unavailable",
        DrawError::Allocation { .. } => "Too large",
    }
}

/// On-screen target: content plus editor chrome, with hit testing.
pub struct PreviewTarget {
    canvas: Canvas,
    placements: Vec<Placement>,
    placeholders: Vec<Placeholder>,
}

impl PreviewTarget {
    pub fn new(surface: Surface) -> Result<Self, RenderError> {
        let (width, height) = surface.pixel_size();
        check_output_size(width, height)?;
        Ok(Self {
            canvas: Canvas::new(surface)?,
            placements: Vec::new(),
            placeholders: Vec::new(),
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        self.canvas.pixmap()
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.canvas.into_pixmap()
    }

    /// Visible layers, back to front.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Topmost visible layer under `point`, honoring rotation.
    pub fn hit_test(&self, point: PixelPoint) -> Option<LayerId> {
        self.placements
            .iter()
            .rev()
            .find(|p| p.contains(point))
            .map(|p| p.id)
    }

    pub fn draw_chrome(&mut self, chrome: &Chrome, fonts: &FontBook) {
        if let Some(step) = chrome.grid {
            self.draw_grid(step);
        }
        let placeholders = std::mem::take(&mut self.placeholders);
        for placeholder in &placeholders {
            self.draw_placeholder(placeholder, fonts);
        }
        self.placeholders = placeholders;

        if let Some(selected) = chrome.selection {
            if let Some(placement) = self.placements.iter().find(|p| p.id == selected).copied() {
                self.draw_selection(&placement);
            }
        }
        for guide in &chrome.guides {
            self.draw_guide(guide);
        }
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, stroke: &Stroke) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.0, from.1);
        pb.line_to(to.0, to.1);
        let Some(path) = pb.finish() else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color(color.to_skia());
        self.canvas
            .pixmap_mut()
            .stroke_path(&path, &paint, stroke, Transform::identity(), None);
    }

    fn draw_grid(&mut self, step: f32) {
        if !step.is_finite() || step < 2.0 {
            return;
        }
        let surface = self.canvas.surface();
        let stroke = Stroke {
            width: 1.0,
            ..Stroke::default()
        };
        let mut x = step;
        while x < surface.width {
            self.stroke_line((x, 0.0), (x, surface.height), GRID_COLOR, &stroke);
            x += step;
        }
        let mut y = step;
        while y < surface.height {
            self.stroke_line((0.0, y), (surface.width, y), GRID_COLOR, &stroke);
            y += step;
        }
    }

    fn draw_guide(&mut self, guide: &Guideline) {
        let surface = self.canvas.surface();
        let stroke = Stroke {
            width: 1.0,
            dash: StrokeDash::new(vec![4.0, 3.0], 0.0),
            ..Stroke::default()
        };
        let color = guide_color(guide.class);
        match guide.axis {
            Axis::X => self.stroke_line(
                (guide.position, 0.0),
                (guide.position, surface.height),
                color,
                &stroke,
            ),
            Axis::Y => self.stroke_line(
                (0.0, guide.position),
                (surface.width, guide.position),
                color,
                &stroke,
            ),
        }
    }

    fn draw_selection(&mut self, placement: &Placement) {
        let b = placement.bounds.inflate(2.0);
        let center = placement.bounds.center();
        let transform = Transform::from_rotate_at(placement.rotation, center.x, center.y);
        let mut paint = Paint {
            anti_alias: true,
            ..Paint::default()
        };
        let pixmap = self.canvas.pixmap_mut();

        if let Some(rect) = Rect::from_xywh(b.x, b.y, b.width.max(1.0), b.height.max(1.0)) {
            paint.set_color(SELECTION_COLOR.to_skia());
            let stroke = Stroke {
                width: 1.5,
                ..Stroke::default()
            };
            pixmap.stroke_path(&PathBuilder::from_rect(rect), &paint, &stroke, transform, None);
        }

        let half = HANDLE_SIZE / 2.0;
        for (hx, hy) in [(b.x, b.y), (b.right(), b.y), (b.x, b.bottom()), (b.right(), b.bottom())] {
            let Some(rect) = Rect::from_xywh(hx - half, hy - half, HANDLE_SIZE, HANDLE_SIZE) else {
                continue;
            };
            paint.set_color(Color::WHITE.to_skia());
            pixmap.fill_rect(rect, &paint, transform, None);
            paint.set_color(SELECTION_COLOR.to_skia());
            pixmap.stroke_path(
                &PathBuilder::from_rect(rect),
                &paint,
                &Stroke::default(),
                transform,
                None,
            );
        }
    }

    fn draw_placeholder(&mut self, placeholder: &Placeholder, fonts: &FontBook) {
        let placement = &placeholder.placement;
        let b = placement.bounds;
        let Some(rect) = Rect::from_xywh(b.x, b.y, b.width.max(1.0), b.height.max(1.0)) else {
            return;
        };
        let center = b.center();
        let transform = Transform::from_rotate_at(placement.rotation, center.x, center.y);
        let mut paint = Paint {
            anti_alias: true,
            ..Paint::default()
        };
        let pixmap = self.canvas.pixmap_mut();

        paint.set_color(PLACEHOLDER_FILL.to_skia());
        pixmap.fill_rect(rect, &paint, transform, None);

        paint.set_color(PLACEHOLDER_INK.to_skia());
        let dashed = Stroke {
            width: 1.5,
            dash: StrokeDash::new(vec![6.0, 4.0], 0.0),
            ..Stroke::default()
        };
        pixmap.stroke_path(&PathBuilder::from_rect(rect), &paint, &dashed, transform, None);

        let mut pb = PathBuilder::new();
        pb.move_to(b.x, b.y);
        pb.line_to(b.right(), b.bottom());
        pb.move_to(b.right(), b.y);
        pb.line_to(b.x, b.bottom());
        if let Some(cross) = pb.finish() {
            pixmap.stroke_path(&cross, &paint, &Stroke::default(), transform, None);
        }

        let Some(font) = fonts.resolve("sans-serif", FontWeight::NORMAL) else {
            return;
        };
        let raster = rasterize_line(font, &placeholder.label, LABEL_SIZE, 0.0);
        if let Some(label) = tint(&raster.coverage, raster.width, raster.height, PLACEHOLDER_INK) {
            pixmap.draw_pixmap(
                (b.x + 4.0).round() as i32,
                (b.y + 4.0).round() as i32,
                label.as_ref(),
                &PixmapPaint::default(),
                transform,
                None,
            );
        }
    }
}

impl RenderTarget for PreviewTarget {
    fn surface(&self) -> Surface {
        self.canvas.surface()
    }

    fn draw_background(&mut self, image: Option<&Pixmap>, fallback: Color) {
        self.canvas.draw_background(image, fallback);
    }

    fn layer_placed(&mut self, placement: &Placement) {
        self.placements.push(*placement);
    }

    fn draw_layer(&mut self, placement: &Placement, layer: LayerPixmap) {
        self.canvas.draw_layer(placement, &layer);
    }

    fn layer_failed(&mut self, placement: &Placement, error: &DrawError) {
        self.placeholders.push(Placeholder {
            placement: *placement,
            label: placeholder_label(error).to_string(),
        });
    }
}
