//! # Scene Module
//!
//! A template opened for editing or rendering: background reference, the
//! reference width, and the ordered layer list.
//!
//! ## Responsibilities
//! - **Loading**: parse scene documents, assign ids to records that lack one,
//!   validate identity and the reference width.
//! - **Paint order**: stable `(z_index, list position)` ordering, with the
//!   background pseudo-layer sorted before any layer of equal z.
//! - **Surface mapping**: build the [`Normalizer`] for a target width.
//!
//! `REFERENCE_WIDTH` is the one definition of the canonical width; every
//! consumer reads it from the scene it is given.

use crate::error::{RenderError, SceneError};
use crate::layer::{Layer, LayerId};
use crate::normalize::{Normalizer, Surface};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Canonical width that stored lengths are relative to.
pub const REFERENCE_WIDTH: f32 = 1000.0;

fn default_reference_width() -> f32 {
    REFERENCE_WIDTH
}

/// The template image drawn full-bleed behind (or among) the layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    /// Path or URL of the template image.
    #[serde(default)]
    pub source: String,
    /// Native pixel width of the template image.
    pub width: u32,
    /// Native pixel height of the template image.
    pub height: u32,
    #[serde(default)]
    pub z_index: i32,
}

impl Background {
    pub fn new(source: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            source: source.into(),
            width,
            height,
            z_index: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub background: Background,
    #[serde(default = "default_reference_width")]
    pub reference_width: f32,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

/// One entry of the back-to-front paint list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintItem<'a> {
    Background(&'a Background),
    Layer(&'a Layer),
}

impl PaintItem<'_> {
    pub fn id(&self) -> LayerId {
        match self {
            PaintItem::Background(_) => LayerId::BACKGROUND,
            PaintItem::Layer(layer) => layer.id,
        }
    }

    pub fn z_index(&self) -> i32 {
        match self {
            PaintItem::Background(bg) => bg.z_index,
            PaintItem::Layer(layer) => layer.z_index,
        }
    }
}

impl Scene {
    pub fn new(background: Background) -> Self {
        Self {
            background,
            reference_width: REFERENCE_WIDTH,
            layers: Vec::new(),
        }
    }

    pub fn with_layers(mut self, layers: Vec<Layer>) -> Self {
        self.layers = layers;
        self
    }

    /// Parses a scene document, fills in missing layer ids and validates it.
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let mut scene: Scene = serde_json::from_str(json)?;
        scene.assign_missing_ids();
        scene.validate()?;
        Ok(scene)
    }

    pub fn to_json_pretty(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn assign_missing_ids(&mut self) {
        let mut next = self.next_id().0;
        for layer in self.layers.iter_mut() {
            if layer.id == LayerId::UNASSIGNED {
                tracing::warn!("Layer record without id; assigning {}", next);
                layer.id = LayerId(next);
                next += 1;
            }
        }
    }

    /// Checks the scene invariants: a usable reference width, a non-empty
    /// template size, unique ids, and no layer claiming the background id.
    pub fn validate(&self) -> Result<(), SceneError> {
        if !self.reference_width.is_finite() || self.reference_width <= 0.0 {
            return Err(SceneError::InvalidReferenceWidth(self.reference_width));
        }
        if self.background.width == 0 || self.background.height == 0 {
            return Err(SceneError::InvalidTemplateSize {
                width: self.background.width,
                height: self.background.height,
            });
        }

        let mut seen = HashSet::with_capacity(self.layers.len());
        for layer in &self.layers {
            if layer.id.is_background() || layer.id == LayerId::UNASSIGNED {
                return Err(SceneError::ReservedLayerId(layer.id));
            }
            if !seen.insert(layer.id) {
                return Err(SceneError::DuplicateLayerId(layer.id));
            }
        }
        Ok(())
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Replaces the layer with the same id; returns `false` if it is absent.
    pub fn replace_layer(&mut self, layer: Layer) -> bool {
        match self.index_of(layer.id) {
            Some(i) => {
                self.layers[i] = layer;
                true
            }
            None => false,
        }
    }

    /// One past the highest id in use (never below 1).
    pub fn next_id(&self) -> LayerId {
        let max = self
            .layers
            .iter()
            .map(|l| l.id.0)
            .filter(|&id| id != LayerId::UNASSIGNED.0)
            .max()
            .unwrap_or(0);
        LayerId(max.max(0) + 1)
    }

    /// Back-to-front paint list, invisible layers included.
    ///
    /// Sorted by z-index; equal z keeps list order, with the background
    /// counting as the position before the first layer.
    pub fn paint_order(&self) -> Vec<PaintItem<'_>> {
        let mut items: Vec<(i32, isize, PaintItem<'_>)> = Vec::with_capacity(self.layers.len() + 1);
        items.push((
            self.background.z_index,
            -1,
            PaintItem::Background(&self.background),
        ));
        items.extend(
            self.layers
                .iter()
                .enumerate()
                .map(|(i, layer)| (layer.z_index, i as isize, PaintItem::Layer(layer))),
        );
        items.sort_by_key(|(z, slot, _)| (*z, *slot));
        items.into_iter().map(|(_, _, item)| item).collect()
    }

    /// Visible layers only, back to front.
    pub fn visible_layers(&self) -> Vec<&Layer> {
        self.paint_order()
            .into_iter()
            .filter_map(|item| match item {
                PaintItem::Layer(layer) if layer.visible => Some(layer),
                _ => None,
            })
            .collect()
    }

    /// Surface of `target_width` pixels with the template's aspect ratio.
    pub fn surface(&self, target_width: f32) -> Result<Surface, RenderError> {
        Surface::for_template(self.background.width, self.background.height, target_width)
    }

    pub fn normalizer(&self, target_width: f32) -> Result<Normalizer, RenderError> {
        Normalizer::new(self.reference_width, self.surface(target_width)?)
    }
}
