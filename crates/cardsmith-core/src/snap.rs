//! # Snap/Guideline Engine
//!
//! Computes, for a layer being dragged, the nearest alignment line per axis
//! and the anchor position that lands on it.
//!
//! ## Candidates (per axis)
//! - grid lines at multiples of the grid size (when grid snapping is on)
//! - the canvas center line
//! - centers and edges of every other visible layer
//! - the dragged layer's own edges as they were when the drag started
//!
//! Each guide is compared against the dragged box's start, center and end.
//! Within `threshold` pixels the closest pairing wins; pairings within
//! [`SNAP_TIE_EPSILON`] of the closest are tied and the higher [`SnapClass`]
//! wins. Without a candidate in range the raw position is kept.

use crate::layout::{resolve, Axis, Bounds, Placement};
use crate::layer::LayerId;
use crate::normalize::{Normalizer, PixelPoint, Surface};
use crate::scene::Scene;
use serde::Serialize;

/// Distances this close (in pixels) to the best one count as a tie.
pub const SNAP_TIE_EPSILON: f32 = 1.0;

/// Guide categories, lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapClass {
    Grid,
    SelfEdge,
    LayerEdge,
    LayerCenter,
    CanvasCenter,
}

/// A line the preview should draw while the drag is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Guideline {
    pub axis: Axis,
    /// Pixel coordinate along `axis` (x for a vertical line, y for a horizontal one).
    pub position: f32,
    pub class: SnapClass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapResult {
    /// Anchor position after snapping (equal to the input where nothing snapped).
    pub position: PixelPoint,
    pub guides: Vec<Guideline>,
}

impl SnapResult {
    pub fn guide(&self, axis: Axis) -> Option<&Guideline> {
        self.guides.iter().find(|g| g.axis == axis)
    }
}

/// Everything a drag snaps against, collected once at drag start.
#[derive(Debug, Clone)]
pub struct SnapTargets {
    pub surface: Surface,
    /// Visible layers other than the dragged one.
    pub others: Vec<Placement>,
    /// The dragged layer's box at drag start.
    pub origin: Option<Bounds>,
    /// Grid spacing in pixels; `None` disables grid snapping.
    pub grid: Option<f32>,
    pub threshold: f32,
}

impl SnapTargets {
    pub fn collect(
        scene: &Scene,
        normalizer: &Normalizer,
        dragged: LayerId,
        grid: Option<f32>,
        threshold: f32,
    ) -> Self {
        let others = scene
            .visible_layers()
            .into_iter()
            .filter(|layer| layer.id != dragged)
            .map(|layer| resolve(layer, normalizer))
            .collect();
        let origin = scene
            .layer(dragged)
            .map(|layer| resolve(layer, normalizer).bounds);

        Self {
            surface: normalizer.surface(),
            others,
            origin,
            grid: grid.filter(|g| g.is_finite() && *g > 0.0),
            threshold,
        }
    }

    fn guides(&self, axis: Axis, dragged_edges: &[f32; 3]) -> Vec<(f32, SnapClass)> {
        let mut guides = Vec::new();

        let extent = match axis {
            Axis::X => self.surface.width,
            Axis::Y => self.surface.height,
        };
        guides.push((extent / 2.0, SnapClass::CanvasCenter));

        for other in &self.others {
            let [start, center, end] = other.bounds.edges(axis);
            guides.push((center, SnapClass::LayerCenter));
            guides.push((start, SnapClass::LayerEdge));
            guides.push((end, SnapClass::LayerEdge));
        }

        if let Some(origin) = &self.origin {
            for edge in origin.edges(axis) {
                guides.push((edge, SnapClass::SelfEdge));
            }
        }

        if let Some(step) = self.grid {
            for edge in dragged_edges {
                let line = (edge / step).round() * step;
                if (0.0..=extent).contains(&line) {
                    guides.push((line, SnapClass::Grid));
                }
            }
        }

        guides
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    guide: f32,
    class: SnapClass,
    distance: f32,
    shift: f32,
}

fn pick(candidates: &[Candidate]) -> Option<Candidate> {
    let best = candidates
        .iter()
        .map(|c| c.distance)
        .fold(f32::INFINITY, f32::min);
    if !best.is_finite() {
        return None;
    }

    let mut winner: Option<Candidate> = None;
    for c in candidates.iter().filter(|c| c.distance <= best + SNAP_TIE_EPSILON) {
        winner = match winner {
            None => Some(*c),
            Some(w) if c.class > w.class => Some(*c),
            Some(w) if c.class == w.class && c.distance < w.distance => Some(*c),
            keep => keep,
        };
    }
    winner
}

fn snap_axis(targets: &SnapTargets, axis: Axis, bounds: &Bounds) -> Option<Candidate> {
    let edges = bounds.edges(axis);
    let mut candidates = Vec::new();

    for (guide, class) in targets.guides(axis, &edges) {
        for edge in edges {
            let distance = (guide - edge).abs();
            if distance <= targets.threshold {
                candidates.push(Candidate {
                    guide,
                    class,
                    distance,
                    shift: guide - edge,
                });
            }
        }
    }

    pick(&candidates)
}

/// Snaps `dragged` (already moved to the raw pointer-driven anchor).
pub fn snap(dragged: &Placement, targets: &SnapTargets) -> SnapResult {
    let mut position = dragged.anchor;
    let mut guides = Vec::with_capacity(2);

    if let Some(c) = snap_axis(targets, Axis::X, &dragged.bounds) {
        position.x += c.shift;
        guides.push(Guideline {
            axis: Axis::X,
            position: c.guide,
            class: c.class,
        });
    }
    if let Some(c) = snap_axis(targets, Axis::Y, &dragged.bounds) {
        position.y += c.shift;
        guides.push(Guideline {
            axis: Axis::Y,
            position: c.guide,
            class: c.class,
        });
    }

    SnapResult { position, guides }
}
