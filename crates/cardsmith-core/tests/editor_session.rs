mod common;

use cardsmith_core::editor::TransformOp;
use cardsmith_core::layer::{ShapeGeometry, Size};
use cardsmith_core::layout::Axis;
use cardsmith_core::{
    Background, Color, EditorConfig, EditorSession, FontBook, ImageCache, Layer, LayerId,
    LayerKind, PercentPoint, PixelPoint, Scene, SnapClass,
};
use common::{init_tracing, png_bytes, MockLoader};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn quiet_config() -> EditorConfig {
    EditorConfig {
        grid_enabled: false,
        snap_to_grid: false,
        ..EditorConfig::default()
    }
}

fn open(scene: Scene, loader: MockLoader, config: EditorConfig) -> EditorSession {
    let images = ImageCache::new(Arc::new(loader));
    EditorSession::open(scene, config, images, FontBook::default()).unwrap()
}

fn green_background() -> (Scene, MockLoader) {
    let loader = MockLoader::new().with_file("bg.png", png_bytes(20, 10, [0, 160, 0, 255]));
    let scene = Scene::new(Background::new("bg.png", 200, 100));
    (scene, loader)
}

#[test]
fn requested_background_appears_in_preview() {
    init_tracing();
    let (scene, loader) = green_background();
    let mut session = open(scene, loader, quiet_config());

    let (before, report) = session.render_preview().unwrap();
    assert!(report.is_clean());
    let px = before.pixmap().pixel(100, 50).unwrap();
    assert_eq!((px.red(), px.green(), px.blue()), (255, 255, 255));

    assert_eq!(session.request_assets(), vec!["bg.png".to_string()]);
    // Already in flight: nothing new to request.
    assert!(session.request_assets().is_empty());
    assert_eq!(session.wait_for_assets(WAIT), 1);

    let (after, report) = session.render_preview().unwrap();
    assert!(report.is_clean());
    let px = after.pixmap().pixel(100, 50).unwrap();
    assert!(px.red() <= 2 && px.blue() <= 2);
    assert!(px.green().abs_diff(160) <= 2);
}

#[test]
fn load_finishing_after_a_mutation_is_requested_again() {
    let (scene, loader) = green_background();
    let scene = scene.with_layers(vec![Layer::shape(LayerId(1), ShapeGeometry::Circle)]);
    let loader = Arc::new(loader.with_delay(Duration::from_millis(50)));
    let images = ImageCache::new(loader.clone());
    let mut session =
        EditorSession::open(scene, quiet_config(), images, FontBook::default()).unwrap();

    assert_eq!(session.request_assets(), vec!["bg.png".to_string()]);
    session.toggle_visibility(LayerId(1)).unwrap();
    // The first result is stale; the reissued one lands.
    assert_eq!(session.wait_for_assets(WAIT), 1);
    assert_eq!(loader.calls(), 2);
    assert!(matches!(session.images().get("bg.png"), Some(Ok(_))));
    assert!(session.request_assets().is_empty());

    let (preview, _) = session.render_preview().unwrap();
    let px = preview.pixmap().pixel(5, 5).unwrap();
    assert!(px.green().abs_diff(160) <= 2);
}

#[test]
fn stale_load_of_a_dropped_source_is_not_reissued() {
    let scene = Scene::new(Background::new("", 400, 200))
        .with_layers(vec![Layer::image(LayerId(7), "logo.png")]);
    let loader = Arc::new(
        MockLoader::new()
            .with_file("logo.png", png_bytes(8, 8, [0, 0, 255, 255]))
            .with_delay(Duration::from_millis(50)),
    );
    let images = ImageCache::new(loader.clone());
    let mut session =
        EditorSession::open(scene, quiet_config(), images, FontBook::default()).unwrap();

    session.request_assets();
    session.delete(LayerId(7)).unwrap();
    assert_eq!(session.wait_for_assets(WAIT), 0);
    assert_eq!(loader.calls(), 1);
    assert!(session.images().get("logo.png").is_none());
}

#[test]
fn unloaded_image_shows_loading_placeholder() {
    let scene = Scene::new(Background::new("", 400, 200))
        .with_layers(vec![Layer::image(LayerId(7), "logo.png")]);
    let loader = MockLoader::new().with_file("logo.png", png_bytes(8, 8, [0, 0, 255, 255]));
    let session = open(scene, loader, quiet_config());

    let (preview, report) = session.render_preview().unwrap();
    assert!(report.is_clean());
    assert_eq!(preview.placeholders().len(), 1);
    assert_eq!(preview.placeholders()[0].label, "Loading");
    assert_eq!(preview.placeholders()[0].placement.id, LayerId(7));
    // Still selectable while loading.
    assert_eq!(preview.hit_test(PixelPoint::new(200.0, 100.0)), Some(LayerId(7)));
}

#[test]
fn failed_load_shows_missing_placeholder_and_warning() {
    let scene = Scene::new(Background::new("", 400, 200))
        .with_layers(vec![Layer::image(LayerId(7), "gone.png")]);
    let mut session = open(scene, MockLoader::new(), quiet_config());

    session.request_assets();
    assert_eq!(session.wait_for_assets(WAIT), 1);

    let (preview, report) = session.render_preview().unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(preview.placeholders()[0].label, "Missing image");
}

#[test]
fn layer_center_outranks_grid_at_equal_distance() {
    let other = Layer::shape(LayerId(1), ShapeGeometry::Rectangle)
        .at(PercentPoint::new(31.6, 20.0))
        .sized(Size::new(100.0, 40.0));
    let dragged = Layer::shape(LayerId(2), ShapeGeometry::Rectangle)
        .at(PercentPoint::new(80.0, 80.0))
        .sized(Size::new(0.0, 0.0));
    let scene = Scene::new(Background::new("", 1000, 500)).with_layers(vec![other, dragged]);
    let config = EditorConfig {
        grid_enabled: false,
        snap_to_grid: true,
        grid_size: 50.0,
        snap_threshold: 10.0,
        ..EditorConfig::default()
    };
    let mut session = open(scene, MockLoader::new(), config);

    session.begin_drag(LayerId(2), PixelPoint::new(800.0, 400.0)).unwrap();
    let result = session.drag_to(PixelPoint::new(308.0, 400.0)).unwrap();

    let x = result.guide(Axis::X).unwrap();
    assert_eq!(x.class, SnapClass::LayerCenter);
    assert!((result.position.x - 316.0).abs() < 1e-3);
    assert_eq!(session.guides().len(), result.guides.len());

    let moved = session.end_drag().unwrap();
    assert!((moved.position.x - 31.6).abs() < 1e-3);
    assert!(session.guides().is_empty());
}

#[test]
fn undo_redo_walks_every_mutation() {
    let scene = Scene::new(Background::new("", 1000, 600)).with_layers(vec![
        Layer::text(LayerId(1), "Certificate of {{award}}").at(PercentPoint::new(50.0, 20.0)),
        Layer::shape(LayerId(2), ShapeGeometry::Rectangle),
        Layer::image(LayerId(3), "seal.png").at(PercentPoint::new(85.0, 80.0)),
    ]);
    let mut session = open(scene, MockLoader::new(), quiet_config());
    let mut states = vec![session.scene().clone()];

    session.rename(LayerId(1), "Title").unwrap();
    states.push(session.scene().clone());

    let mut restyled = session.scene().layer(LayerId(2)).unwrap().clone();
    if let LayerKind::Shape(shape) = &mut restyled.kind {
        shape.style.fill = Some(Color::rgb(10, 20, 30));
    }
    session.edit_style(restyled).unwrap();
    states.push(session.scene().clone());

    session.transform(&[LayerId(3)], TransformOp::RotateTo(30.0)).unwrap();
    states.push(session.scene().clone());

    session.duplicate(&[LayerId(2)]).unwrap();
    states.push(session.scene().clone());

    session.reorder(LayerId::BACKGROUND, 3).unwrap();
    states.push(session.scene().clone());

    session.move_down(LayerId(1)).unwrap();
    states.push(session.scene().clone());

    session.toggle_lock(LayerId(3)).unwrap();
    states.push(session.scene().clone());

    session.delete(LayerId(2)).unwrap();
    states.push(session.scene().clone());

    for expected in states.iter().rev().skip(1) {
        assert!(session.undo());
        assert_eq!(session.scene(), expected);
    }
    assert!(!session.undo());

    for expected in states.iter().skip(1) {
        assert!(session.redo());
        assert_eq!(session.scene(), expected);
    }
    assert!(!session.redo());
}

#[test]
fn new_edit_after_undo_clears_redo() {
    let scene = Scene::new(Background::new("", 1000, 600))
        .with_layers(vec![Layer::shape(LayerId(1), ShapeGeometry::Rectangle)]);
    let mut session = open(scene, MockLoader::new(), quiet_config());

    session.toggle_visibility(LayerId(1)).unwrap();
    assert!(session.undo());
    assert!(session.can_redo());
    session.rename(LayerId(1), "Box").unwrap();
    assert!(!session.can_redo());
}

#[test]
fn history_limit_drops_oldest() {
    let scene = Scene::new(Background::new("", 1000, 600))
        .with_layers(vec![Layer::shape(LayerId(1), ShapeGeometry::Rectangle)]);
    let config = EditorConfig {
        history_limit: Some(2),
        ..quiet_config()
    };
    let mut session = open(scene, MockLoader::new(), config);

    for name in ["a", "b", "c"] {
        session.rename(LayerId(1), name).unwrap();
    }
    assert!(session.undo());
    assert!(session.undo());
    assert!(!session.undo());
    assert_eq!(session.scene().layers[0].label, "a");
}

#[test]
fn saved_layers_do_not_depend_on_viewport() {
    let scene = Scene::new(Background::new("", 1000, 500)).with_layers(vec![
        Layer::shape(LayerId(1), ShapeGeometry::Rectangle).at(PercentPoint::new(20.0, 20.0)),
    ]);
    let mut small = open(scene.clone(), MockLoader::new(), quiet_config());
    let mut large = open(scene, MockLoader::new(), quiet_config());
    small.set_viewport(400.0).unwrap();
    large.set_viewport(1600.0).unwrap();

    for session in [&mut small, &mut large] {
        session
            .transform(&[LayerId(1)], TransformOp::Nudge { dx: 100.0, dy: -50.0 })
            .unwrap();
        session
            .transform(&[LayerId(1)], TransformOp::Resize(Size::new(300.0, 120.0)))
            .unwrap();
    }

    let a = small.save();
    let b = large.save();
    assert_eq!(a.len(), 1);
    assert!((a[0].position.x - b[0].position.x).abs() < 1e-4);
    assert!((a[0].position.y - b[0].position.y).abs() < 1e-4);
    assert_eq!(a[0].size, b[0].size);

    small.set_viewport(2400.0).unwrap();
    assert_eq!(small.save(), a);
}
