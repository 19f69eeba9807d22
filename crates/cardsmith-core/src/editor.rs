//! # Editor Session
//!
//! Interactive editing of one [`Scene`] on a preview surface.
//!
//! ## Responsibilities
//! - **Dragging**: `begin_drag` -> `drag_to`* -> `end_drag`. Every move
//!   re-runs the snap engine and updates the active guidelines. The scene
//!   as it was at the start is held by the drag and pushed to history only
//!   when the end commits an actual move; a cancel restores it untouched.
//! - **Editing**: transforms, style edits and ordering operations, each
//!   preceded by a history snapshot of the whole scene.
//! - **Assets**: loads run on background threads and are tagged with the
//!   scene generation they were requested for. A result that arrives after
//!   the scene changed is discarded, and requested again if the scene still
//!   references it.
//! - **Preview**: renders through the shared compositor using cached images
//!   only, then draws grid, guidelines, selection and placeholder boxes.
//!
//! The session is single-threaded; nothing else mutates the scene.

use crate::assets::{self, ImageCache};
use crate::config::EditorConfig;
use crate::error::{AssetError, EditorError, OrderingError, RenderError};
use crate::history::History;
use crate::layer::{Layer, LayerId, LayerKind, Size};
use crate::layout::{resolve, resolve_scene};
use crate::normalize::{Normalizer, PercentPoint, PixelPoint};
use crate::ordering;
use crate::placeholder::FormData;
use crate::render::{compose, Chrome, ImageAccess, PreviewTarget, RenderContext, RenderReport};
use crate::scene::Scene;
use crate::snap::{snap, Guideline, SnapResult, SnapTargets};
use crate::text::FontBook;
use crossbeam_channel::{Receiver, Sender};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_skia::Pixmap;

/// A bulk geometry edit applied to every listed layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOp {
    /// New size in reference units. Text layers take the width as `maxWidth`.
    Resize(Size),
    /// Multiplies size (and font size for text).
    Scale(f32),
    RotateTo(f32),
    RotateBy(f32),
    /// Moves by a displacement in reference units.
    Nudge { dx: f32, dy: f32 },
}

impl TransformOp {
    fn apply(self, layer: &mut Layer, nudge: (f32, f32)) {
        match self {
            TransformOp::Resize(size) => {
                let size = Size::new(size.width.max(0.0), size.height.max(0.0));
                if let LayerKind::Text(text) = &mut layer.kind {
                    text.style.max_width = size.width;
                }
                layer.size = size;
            }
            TransformOp::Scale(factor) => {
                let factor = factor.max(0.0);
                layer.size = Size::new(layer.size.width * factor, layer.size.height * factor);
                if let LayerKind::Text(text) = &mut layer.kind {
                    text.style.font_size *= factor;
                    text.style.max_width *= factor;
                }
            }
            TransformOp::RotateTo(degrees) => layer.rotation = degrees.rem_euclid(360.0),
            TransformOp::RotateBy(degrees) => {
                layer.rotation = (layer.rotation + degrees).rem_euclid(360.0)
            }
            TransformOp::Nudge { .. } => layer.position = layer.position.offset(nudge.0, nudge.1),
        }
    }
}

/// Result of a background image load, tagged with the generation it was
/// requested for.
#[derive(Debug)]
pub struct LoadedAsset {
    pub generation: u64,
    pub source: String,
    pub result: Result<Arc<Pixmap>, AssetError>,
}

#[derive(Debug, Clone)]
struct Drag {
    id: LayerId,
    targets: SnapTargets,
    /// Pointer minus anchor at drag start, in pixels.
    grab: (f32, f32),
    start: PercentPoint,
    /// Scene at drag start; becomes the undo snapshot on commit.
    before: Scene,
}

pub struct EditorSession {
    scene: Scene,
    config: EditorConfig,
    history: History<Scene>,
    viewport_width: f32,
    selection: Option<LayerId>,
    drag: Option<Drag>,
    guides: Vec<Guideline>,
    preview_data: FormData,
    images: ImageCache,
    fonts: FontBook,
    generation: u64,
    in_flight: HashSet<String>,
    last_good_background: Option<Arc<Pixmap>>,
    loads_tx: Sender<LoadedAsset>,
    loads_rx: Receiver<LoadedAsset>,
}

impl EditorSession {
    /// Opens `scene` for editing. The viewport starts at the template's
    /// native width.
    pub fn open(
        scene: Scene,
        config: EditorConfig,
        images: ImageCache,
        fonts: FontBook,
    ) -> Result<Self, EditorError> {
        scene.validate()?;
        let viewport_width = scene.background.width as f32;
        scene.normalizer(viewport_width)?;

        let last_good_background = match images.get(&scene.background.source) {
            Some(Ok(image)) => Some(image),
            _ => None,
        };
        let (loads_tx, loads_rx) = crossbeam_channel::unbounded();
        tracing::info!(
            "Opened scene with {} layers ({}x{})",
            scene.layers.len(),
            scene.background.width,
            scene.background.height
        );

        Ok(Self {
            history: History::new(config.history_limit),
            scene,
            config,
            viewport_width,
            selection: None,
            drag: None,
            guides: Vec::new(),
            preview_data: FormData::new(),
            images,
            fonts,
            generation: 0,
            in_flight: HashSet::new(),
            last_good_background,
            loads_tx,
            loads_rx,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn selection(&self) -> Option<LayerId> {
        self.selection
    }

    /// Guidelines for the current drag; empty when not dragging.
    pub fn guides(&self) -> &[Guideline] {
        &self.guides
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Bumped by every committed change to the scene.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    /// Form data used to fill placeholders in the preview.
    pub fn set_preview_data(&mut self, data: FormData) {
        self.preview_data = data;
    }

    pub fn normalizer(&self) -> Result<Normalizer, RenderError> {
        self.scene.normalizer(self.viewport_width)
    }

    /// Changes the on-screen width of the preview surface.
    pub fn set_viewport(&mut self, width: f32) -> Result<(), EditorError> {
        if let Some(drag) = &self.drag {
            return Err(EditorError::DragInProgress(drag.id));
        }
        self.scene.surface(width)?;
        self.viewport_width = width;
        Ok(())
    }

    pub fn select(&mut self, id: Option<LayerId>) -> Result<(), EditorError> {
        if let Some(id) = id {
            if self.scene.layer(id).is_none() {
                return Err(OrderingError::NotFound(id).into());
            }
        }
        self.selection = id;
        Ok(())
    }

    /// Selects the topmost visible layer under `point` (viewport pixels).
    pub fn select_at(&mut self, point: PixelPoint) -> Result<Option<LayerId>, EditorError> {
        let normalizer = self.normalizer()?;
        let hit = resolve_scene(&self.scene, &normalizer)
            .iter()
            .rev()
            .find(|p| p.contains(point))
            .map(|p| p.id);
        self.selection = hit;
        Ok(hit)
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    fn ensure_idle(&self) -> Result<(), EditorError> {
        match &self.drag {
            Some(drag) => Err(EditorError::DragInProgress(drag.id)),
            None => Ok(()),
        }
    }

    /// Runs `op` against the scene with a history snapshot taken first.
    /// On error the scene is left as it was and no history is recorded.
    fn apply<T>(
        &mut self,
        op: impl FnOnce(&mut Scene) -> Result<T, OrderingError>,
    ) -> Result<T, EditorError> {
        self.ensure_idle()?;
        let before = self.scene.clone();
        match op(&mut self.scene) {
            Ok(value) => {
                self.history.push(before);
                self.bump();
                Ok(value)
            }
            Err(err) => {
                self.scene = before;
                Err(err.into())
            }
        }
    }

    pub fn begin_drag(&mut self, id: LayerId, pointer: PixelPoint) -> Result<(), EditorError> {
        self.ensure_idle()?;
        if id.is_background() {
            return Err(OrderingError::BackgroundProtected("moved").into());
        }
        let layer = self.scene.layer(id).ok_or(OrderingError::NotFound(id))?;
        if layer.locked {
            return Err(OrderingError::Locked(id).into());
        }
        let start = layer.position;

        let normalizer = self.normalizer()?;
        let anchor = normalizer.to_pixels(start);
        let grid = self
            .config
            .snap_to_grid
            .then(|| normalizer.length(self.config.grid_size));
        let targets = SnapTargets::collect(
            &self.scene,
            &normalizer,
            id,
            grid,
            self.config.snap_threshold,
        );

        self.drag = Some(Drag {
            id,
            targets,
            grab: (pointer.x - anchor.x, pointer.y - anchor.y),
            start,
            before: self.scene.clone(),
        });
        self.selection = Some(id);
        tracing::debug!("Drag started on layer {}", id);
        Ok(())
    }

    /// Moves the dragged layer under `pointer`, snapped. Does not touch history.
    pub fn drag_to(&mut self, pointer: PixelPoint) -> Result<SnapResult, EditorError> {
        let normalizer = self.normalizer()?;
        let drag = self.drag.as_ref().ok_or(EditorError::NoDrag)?;
        let id = drag.id;
        let layer = self.scene.layer(id).ok_or(OrderingError::NotFound(id))?;

        let raw = PixelPoint::new(pointer.x - drag.grab.0, pointer.y - drag.grab.1);
        let proposed = resolve(layer, &normalizer).moved_to(raw);
        let result = snap(&proposed, &drag.targets);

        let position = normalizer.to_percent(result.position);
        if let Some(index) = self.scene.index_of(id) {
            self.scene.layers[index].position = position;
        }
        self.guides = result.guides.clone();
        Ok(result)
    }

    /// Commits the drag and returns the moved layer for persistence.
    ///
    /// A drag that ends where it started leaves history (redo included)
    /// untouched.
    pub fn end_drag(&mut self) -> Result<Layer, EditorError> {
        let drag = self.drag.take().ok_or(EditorError::NoDrag)?;
        self.guides.clear();
        let layer = self
            .scene
            .layer(drag.id)
            .cloned()
            .ok_or(OrderingError::NotFound(drag.id))?;

        if layer.position == drag.start {
            tracing::debug!("Drag on layer {} ended without movement", drag.id);
        } else {
            self.history.push(drag.before);
            self.bump();
            tracing::debug!(
                "Layer {} moved to ({:.2}%, {:.2}%)",
                drag.id,
                layer.position.x,
                layer.position.y
            );
        }
        Ok(layer)
    }

    /// Abandons the drag, restoring the layer to where it started.
    /// History is not touched.
    pub fn cancel_drag(&mut self) -> Result<(), EditorError> {
        let drag = self.drag.take().ok_or(EditorError::NoDrag)?;
        self.guides.clear();
        self.scene = drag.before;
        Ok(())
    }

    pub fn transform(&mut self, ids: &[LayerId], op: TransformOp) -> Result<(), EditorError> {
        let nudge = match op {
            TransformOp::Nudge { dx, dy } => self.normalizer()?.reference_delta_percent(dx, dy),
            _ => (0.0, 0.0),
        };
        self.apply(|scene| {
            for &id in ids {
                if id.is_background() {
                    return Err(OrderingError::BackgroundProtected("transformed"));
                }
                let layer = scene.layer(id).ok_or(OrderingError::NotFound(id))?;
                if layer.locked {
                    return Err(OrderingError::Locked(id));
                }
            }
            for layer in scene.layers.iter_mut().filter(|l| ids.contains(&l.id)) {
                op.apply(layer, nudge);
            }
            Ok(())
        })
    }

    /// Replaces the layer with the same id by `layer`.
    ///
    /// Paint order is owned by the ordering operations, so the layer keeps
    /// its current `z_index`. A locked layer keeps its geometry: an edit
    /// that moves, resizes or rotates it is refused.
    pub fn edit_style(&mut self, mut layer: Layer) -> Result<(), EditorError> {
        let id = layer.id;
        self.apply(|scene| {
            if id.is_background() {
                return Err(OrderingError::BackgroundProtected("edited"));
            }
            let current = scene.layer(id).ok_or(OrderingError::NotFound(id))?;
            let moved = layer.position != current.position
                || layer.size != current.size
                || layer.rotation != current.rotation;
            if current.locked && moved {
                return Err(OrderingError::Locked(id));
            }
            layer.z_index = current.z_index;
            if scene.replace_layer(layer) {
                Ok(())
            } else {
                Err(OrderingError::NotFound(id))
            }
        })
    }

    /// Adds `layer` on top and selects it.
    pub fn add_layer(&mut self, layer: Layer) -> Result<LayerId, EditorError> {
        let id = self.apply(|scene| Ok(ordering::add(scene, layer)))?;
        self.selection = Some(id);
        Ok(id)
    }

    pub fn delete(&mut self, id: LayerId) -> Result<Layer, EditorError> {
        let removed = self.apply(|scene| ordering::delete(scene, id))?;
        if self.selection == Some(id) {
            self.selection = None;
        }
        Ok(removed)
    }

    /// Duplicates `ids`; the last copy becomes the selection.
    pub fn duplicate(&mut self, ids: &[LayerId]) -> Result<Vec<LayerId>, EditorError> {
        let created = self.apply(|scene| ordering::duplicate(scene, ids))?;
        if let Some(last) = created.last() {
            self.selection = Some(*last);
        }
        Ok(created)
    }

    pub fn move_up(&mut self, id: LayerId) -> Result<(), EditorError> {
        self.apply(|scene| ordering::move_up(scene, id))
    }

    pub fn move_down(&mut self, id: LayerId) -> Result<(), EditorError> {
        self.apply(|scene| ordering::move_down(scene, id))
    }

    pub fn reorder(&mut self, id: LayerId, index: usize) -> Result<(), EditorError> {
        self.apply(|scene| ordering::reorder(scene, id, index))
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> Result<bool, EditorError> {
        self.apply(|scene| ordering::toggle_visibility(scene, id))
    }

    pub fn toggle_lock(&mut self, id: LayerId) -> Result<bool, EditorError> {
        self.apply(|scene| ordering::toggle_lock(scene, id))
    }

    pub fn rename(&mut self, id: LayerId, label: &str) -> Result<(), EditorError> {
        self.apply(|scene| ordering::rename(scene, id, label))
    }

    fn restored(&mut self, scene: Scene) {
        self.scene = scene;
        self.guides.clear();
        if let Some(id) = self.selection {
            if self.scene.layer(id).is_none() {
                self.selection = None;
            }
        }
        self.bump();
    }

    /// Steps back one snapshot. During a drag, cancels the drag instead.
    pub fn undo(&mut self) -> bool {
        if self.drag.is_some() {
            return self.cancel_drag().is_ok();
        }
        match self.history.undo(self.scene.clone()) {
            Some(previous) => {
                self.restored(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.drag.is_some() {
            return false;
        }
        match self.history.redo(self.scene.clone()) {
            Some(next) => {
                self.restored(next);
                true
            }
            None => false,
        }
    }

    /// The layer list to hand to persistence. Positions are percentages and
    /// lengths reference units, independent of the viewport.
    pub fn save(&self) -> Vec<Layer> {
        self.scene.layers.clone()
    }

    fn referenced_sources(&self) -> BTreeSet<String> {
        let mut sources = BTreeSet::new();
        if !self.scene.background.source.is_empty() {
            sources.insert(self.scene.background.source.clone());
        }
        for layer in &self.scene.layers {
            if let LayerKind::Image(image) = &layer.kind {
                if !image.source.is_empty() {
                    sources.insert(image.source.clone());
                }
            }
        }
        sources
    }

    /// Starts background loads for every referenced image that is neither
    /// cached nor already loading. Returns the sources requested.
    pub fn request_assets(&mut self) -> Vec<String> {
        let mut requested = Vec::new();
        for source in self.referenced_sources() {
            if self.images.get(&source).is_some() || self.in_flight.contains(&source) {
                continue;
            }
            if self.spawn_load(&source) {
                requested.push(source);
            }
        }
        requested
    }

    /// Loads `source` on a worker thread, tagged with the current generation.
    fn spawn_load(&mut self, source: &str) -> bool {
        let loader = self.images.loader();
        let tx = self.loads_tx.clone();
        let generation = self.generation;
        let owned = source.to_string();
        let spawned = std::thread::Builder::new()
            .name("editor-asset".to_string())
            .spawn(move || {
                let result = assets::fetch(loader.as_ref(), &owned).map(Arc::new);
                let _ = tx.send(LoadedAsset {
                    generation,
                    source: owned,
                    result,
                });
            });
        match spawned {
            Ok(_) => {
                self.in_flight.insert(source.to_string());
                true
            }
            Err(err) => {
                tracing::warn!("Cannot start load of '{}': {}", source, err);
                false
            }
        }
    }

    /// Applies every finished load without blocking. Returns how many were applied.
    pub fn poll_assets(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(loaded) = self.loads_rx.try_recv() {
            if self.apply_loaded(loaded) {
                applied += 1;
            }
        }
        applied
    }

    /// Blocks until every in-flight load has arrived or `timeout` elapses.
    pub fn wait_for_assets(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.loads_rx.recv_timeout(remaining) {
                Ok(loaded) => {
                    if self.apply_loaded(loaded) {
                        applied += 1;
                    }
                }
                Err(_) => break,
            }
        }
        applied
    }

    /// Stores a finished load unless the scene changed since it was requested.
    ///
    /// A stale load whose source the scene still references is started again
    /// at the current generation, so it does not stay "Loading" until the
    /// next [`EditorSession::request_assets`].
    pub fn apply_loaded(&mut self, loaded: LoadedAsset) -> bool {
        self.in_flight.remove(&loaded.source);
        if loaded.generation != self.generation {
            tracing::debug!(
                "Discarding stale load of '{}' (requested at generation {}, now {})",
                loaded.source,
                loaded.generation,
                self.generation
            );
            let wanted = self.referenced_sources().contains(&loaded.source)
                && self.images.get(&loaded.source).is_none();
            if wanted {
                self.spawn_load(&loaded.source);
            }
            return false;
        }

        match &loaded.result {
            Ok(image) if loaded.source == self.scene.background.source => {
                self.last_good_background = Some(image.clone());
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("{}", err),
        }
        self.images.insert(loaded.source, loaded.result);
        true
    }

    /// Renders the scene plus editor chrome at the current viewport width.
    pub fn render_preview(&self) -> Result<(PreviewTarget, RenderReport), RenderError> {
        let normalizer = self.normalizer()?;
        let mut target = PreviewTarget::new(normalizer.surface())?;
        let ctx = RenderContext::new(normalizer, &self.preview_data, &self.images, &self.fonts)
            .with_access(ImageAccess::CachedOnly)
            .with_last_good_background(self.last_good_background.clone());
        let report = compose(&self.scene, &ctx, &mut target)?;

        let chrome = Chrome {
            selection: self.selection,
            guides: self.guides.clone(),
            grid: self
                .config
                .grid_enabled
                .then(|| normalizer.length(self.config.grid_size)),
        };
        target.draw_chrome(&chrome, &self.fonts);
        Ok((target, report))
    }
}
