use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const SCENE: &str = r##"{
  "background": { "source": "", "width": 200, "height": 100 },
  "layers": [
    {
      "id": 1,
      "type": "shape",
      "position": { "x": 50, "y": 50 },
      "size": { "width": 400, "height": 200 },
      "style": { "geometry": "rectangle", "fill": "#ff0000" }
    },
    { "id": 2, "type": "text", "content": "Awarded to {{name}}" }
  ]
}"##;

fn cardsmith(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cardsmith"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run cardsmith")
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn render_writes_a_png_at_template_size() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write(dir.path(), "scene.json", SCENE);
    let data = write(dir.path(), "row.json", r#"{ "name": "Ada" }"#);
    let output = dir.path().join("out.png");

    let result = cardsmith(&[
        "render",
        "--scene",
        arg(&scene),
        "--data",
        arg(&data),
        "--output",
        arg(&output),
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let img = image::open(&output).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (200, 100));
    assert_eq!(img.get_pixel(100, 50).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(5, 5).0, [255, 255, 255, 255]);
}

#[test]
fn quality_flag_scales_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write(dir.path(), "scene.json", SCENE);
    let output = dir.path().join("out.jpg");

    let result = cardsmith(&[
        "render",
        "--scene",
        arg(&scene),
        "--output",
        arg(&output),
        "--format",
        "jpeg",
        "--quality",
        "medium",
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let img = image::open(&output).unwrap();
    assert_eq!((img.width(), img.height()), (400, 200));
}

#[test]
fn batch_writes_one_file_per_row() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write(dir.path(), "scene.json", SCENE);
    let rows = write(
        dir.path(),
        "rows.json",
        r#"[{ "name": "Ada" }, { "name": "Grace" }, { "name": 42 }]"#,
    );
    let out_dir = dir.path().join("out");

    let result = cardsmith(&[
        "batch",
        "--scene",
        arg(&scene),
        "--rows",
        arg(&rows),
        "--out-dir",
        arg(&out_dir),
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
    assert!(String::from_utf8_lossy(&result.stdout).contains("3 rendered, 0 failed"));

    for index in 0..3 {
        let path = out_dir.join(format!("{:04}.png", index));
        assert!(path.exists(), "missing {}", path.display());
    }
}

#[test]
fn batch_fails_when_every_row_fails() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write(
        dir.path(),
        "scene.json",
        r#"{ "background": { "width": 6000, "height": 6000 } }"#,
    );
    let rows = write(dir.path(), "rows.json", r#"[{}, {}]"#);
    let out_dir = dir.path().join("out");

    let result = cardsmith(&[
        "batch",
        "--scene",
        arg(&scene),
        "--rows",
        arg(&rows),
        "--out-dir",
        arg(&out_dir),
        "--quality",
        "ultra",
    ]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stdout).contains("0 rendered, 2 failed"));
    assert!(String::from_utf8_lossy(&result.stderr).contains("Output too large"));
}

#[test]
fn layout_reports_scaled_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write(dir.path(), "scene.json", SCENE);

    let result = cardsmith(&["layout", "--scene", arg(&scene), "--width", "400"]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let dump: serde_json::Value = serde_json::from_slice(&result.stdout).unwrap();
    assert_eq!(dump["width"], 400.0);
    assert_eq!(dump["height"], 200.0);
    let placements = dump["placements"].as_array().unwrap();
    assert_eq!(placements.len(), 2);
    assert_eq!(placements[0]["id"], 1);
    assert_eq!(placements[0]["bounds"]["width"], 160.0);
    assert_eq!(placements[0]["bounds"]["x"], 120.0);
}

#[test]
fn invalid_scene_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write(dir.path(), "scene.json", r#"{ "background": { "width": 0, "height": 10 } }"#);

    let result = cardsmith(&["layout", "--scene", arg(&scene)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Invalid scene"));
}
