//! # Layer Model
//!
//! The atomic positioned element of a template.
//!
//! ## Responsibilities
//! - **Identity**: `LayerId`, with `-1` reserved for the background pseudo-layer.
//! - **Kinds**: a closed tagged union (`text`, `image`, `shape`); each variant
//!   carries only the style fields valid for it.
//! - **Defaults**: every field has a per-kind default so incomplete records
//!   load instead of failing.
//!
//! Positions are percentages of the canvas (`0..=100`); sizes and every
//! length inside a style are reference-width units. Conversion to pixels
//! happens only in [`crate::normalize`].
//!
//! Layers are values: editing operations build a new `Layer` and replace the
//! old one, which keeps history snapshots independent of later edits.

use crate::color::Color;
use crate::normalize::PercentPoint;
use crate::placeholder::{substitute, FormData};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Stable layer identity, unique within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub i64);

impl LayerId {
    /// The background/template-image pseudo-layer.
    pub const BACKGROUND: LayerId = LayerId(-1);
    /// Marker for records that arrived without an id; replaced on scene load.
    pub const UNASSIGNED: LayerId = LayerId(i64::MIN);

    pub fn is_background(self) -> bool {
        self == Self::BACKGROUND
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn unassigned_id() -> LayerId {
    LayerId::UNASSIGNED
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

/// Width/height in reference-width units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    #[serde(default = "unassigned_id")]
    pub id: LayerId,
    /// Stable machine key (used by integrations to map form fields).
    #[serde(default)]
    pub name: String,
    /// Display name shown in the layer list; cosmetic only.
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: LayerKind,
    #[serde(default)]
    pub position: PercentPoint,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    /// Degrees, clockwise, about the layer's own center.
    #[serde(default)]
    pub rotation: f32,
}

impl Layer {
    fn with_kind(id: LayerId, kind: LayerKind, size: Size) -> Self {
        Self {
            id,
            name: String::new(),
            label: String::new(),
            kind,
            position: PercentPoint::CENTER,
            size,
            z_index: 0,
            visible: true,
            locked: false,
            rotation: 0.0,
        }
    }

    pub fn text(id: LayerId, content: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            LayerKind::Text(TextLayer {
                content: content.into(),
                style: TextStyle::default(),
            }),
            Size::default(),
        )
    }

    pub fn image(id: LayerId, source: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            LayerKind::Image(ImageLayer {
                source: source.into(),
                style: ImageStyle::default(),
            }),
            Size::new(200.0, 200.0),
        )
    }

    pub fn shape(id: LayerId, geometry: ShapeGeometry) -> Self {
        Self::with_kind(
            id,
            LayerKind::Shape(ShapeLayer {
                style: ShapeStyle {
                    geometry,
                    ..ShapeStyle::default()
                },
            }),
            Size::new(150.0, 100.0),
        )
    }

    pub fn at(self, position: PercentPoint) -> Self {
        Self { position, ..self }
    }

    pub fn sized(self, size: Size) -> Self {
        Self { size, ..self }
    }

    pub fn rotated(self, rotation: f32) -> Self {
        Self { rotation, ..self }
    }

    pub fn with_z(self, z_index: i32) -> Self {
        Self { z_index, ..self }
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            LayerKind::Text(_) => "text",
            LayerKind::Image(_) => "image",
            LayerKind::Shape(_) => "shape",
        }
    }

    /// Label shown to operators, falling back to the machine name and kind.
    pub fn display_label(&self) -> String {
        if !self.label.is_empty() {
            self.label.clone()
        } else if !self.name.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.kind_name(), self.id)
        }
    }

    /// Text content after placeholder substitution; `None` for non-text layers.
    pub fn resolved_text(&self, form: &FormData) -> Option<String> {
        match &self.kind {
            LayerKind::Text(text) => Some(substitute(&text.content, form)),
            LayerKind::Image(_) | LayerKind::Shape(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerKind {
    Text(TextLayer),
    Image(ImageLayer),
    Shape(ShapeLayer),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLayer {
    /// Literal text or `{{key}}` placeholders.
    #[serde(default, alias = "defaultValue")]
    pub content: String,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayer {
    #[serde(default, alias = "src", alias = "url")]
    pub source: String,
    #[serde(default)]
    pub style: ImageStyle,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeLayer {
    #[serde(default)]
    pub style: ShapeStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// CSS-style numeric weight; also accepts `"normal"` and `"bold"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FontWeight(pub u16);

impl FontWeight {
    pub const NORMAL: FontWeight = FontWeight(400);
    pub const BOLD: FontWeight = FontWeight(700);

    pub fn is_bold(self) -> bool {
        self.0 >= 600
    }
}

impl Default for FontWeight {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl<'de> Deserialize<'de> for FontWeight {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u16),
            Word(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => FontWeight(n),
            Raw::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
                "bold" | "bolder" => FontWeight::BOLD,
                "light" | "lighter" => FontWeight(300),
                other => other.parse().map(FontWeight).unwrap_or_default(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shadow {
    #[serde(default = "Shadow::default_color")]
    pub color: Color,
    #[serde(default)]
    pub blur: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
}

impl Shadow {
    fn default_color() -> Color {
        Color::rgba(0, 0, 0, 128)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    #[default]
    Linear,
    Radial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub color: Color,
    /// Explicit position in `0..=1`; stops without one are spread evenly.
    #[serde(default)]
    pub offset: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gradient {
    #[serde(default)]
    pub kind: GradientKind,
    #[serde(default)]
    pub stops: Vec<ColorStop>,
    /// Direction of a linear gradient in degrees; 0 runs left to right.
    #[serde(default)]
    pub angle: f32,
}

impl Gradient {
    /// Stop positions, using the explicit offsets where given and spreading
    /// the rest evenly over `[0, 1]`.
    pub fn resolved_stops(&self) -> Vec<(f32, Color)> {
        let n = self.stops.len();
        self.stops
            .iter()
            .enumerate()
            .map(|(i, stop)| {
                let even = if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
                (stop.offset.unwrap_or(even).clamp(0.0, 1.0), stop.color)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub color: Color,
    #[serde(default = "default_one")]
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default = "TextStyle::default_family")]
    pub font_family: String,
    #[serde(default = "TextStyle::default_size")]
    pub font_size: f32,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default)]
    pub color: Color,
    #[serde(default, alias = "textAlign")]
    pub align: TextAlign,
    #[serde(default = "TextStyle::default_max_width")]
    pub max_width: f32,
    #[serde(default)]
    pub letter_spacing: f32,
    #[serde(default)]
    pub stroke: Option<Outline>,
    #[serde(default)]
    pub shadow: Option<Shadow>,
    #[serde(default)]
    pub gradient: Option<Gradient>,
}

impl TextStyle {
    fn default_family() -> String {
        "sans-serif".to_string()
    }

    fn default_size() -> f32 {
        32.0
    }

    fn default_max_width() -> f32 {
        300.0
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: Self::default_family(),
            font_size: Self::default_size(),
            font_weight: FontWeight::default(),
            color: Color::BLACK,
            align: TextAlign::default(),
            max_width: Self::default_max_width(),
            letter_spacing: 0.0,
            stroke: None,
            shadow: None,
            gradient: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFilter {
    #[default]
    None,
    Grayscale,
    Sepia,
    Invert,
    Blur,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStyle {
    #[serde(default)]
    pub filter: ImageFilter,
    /// Radius used by [`ImageFilter::Blur`], reference-width units.
    #[serde(default = "ImageStyle::default_blur_radius")]
    pub blur_radius: f32,
    #[serde(default = "default_one")]
    pub opacity: f32,
    #[serde(default, alias = "borderRadius")]
    pub corner_radius: f32,
    #[serde(default)]
    pub border: Option<Outline>,
    #[serde(default)]
    pub shadow: Option<Shadow>,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default = "default_one")]
    pub scale: f32,
}

impl ImageStyle {
    fn default_blur_radius() -> f32 {
        4.0
    }
}

impl Default for ImageStyle {
    fn default() -> Self {
        Self {
            filter: ImageFilter::None,
            blur_radius: Self::default_blur_radius(),
            opacity: 1.0,
            corner_radius: 0.0,
            border: None,
            shadow: None,
            flip_x: false,
            flip_y: false,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeGeometry {
    #[default]
    #[serde(alias = "rect")]
    Rectangle,
    Circle,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    #[serde(default, alias = "shapeType")]
    pub geometry: ShapeGeometry,
    #[serde(default = "ShapeStyle::default_fill")]
    pub fill: Option<Color>,
    #[serde(default)]
    pub stroke: Option<Color>,
    #[serde(default = "ShapeStyle::default_stroke_width")]
    pub stroke_width: f32,
    #[serde(default)]
    pub corner_radius: f32,
    #[serde(default = "default_one")]
    pub opacity: f32,
}

impl ShapeStyle {
    fn default_fill() -> Option<Color> {
        Some(Color::rgb(0xcc, 0xcc, 0xcc))
    }

    fn default_stroke_width() -> f32 {
        2.0
    }
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            geometry: ShapeGeometry::Rectangle,
            fill: Self::default_fill(),
            stroke: None,
            stroke_width: Self::default_stroke_width(),
            corner_radius: 0.0,
            opacity: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_text_record_gets_defaults() {
        let layer: Layer = serde_json::from_str(r#"{"id": 3, "type": "text"}"#).unwrap();
        assert_eq!(layer.id, LayerId(3));
        assert!(layer.visible);
        assert!(!layer.locked);
        assert_eq!(layer.position, PercentPoint::CENTER);
        match &layer.kind {
            LayerKind::Text(text) => {
                assert_eq!(text.content, "");
                assert_eq!(text.style, TextStyle::default());
            }
            other => panic!("expected text layer, got {:?}", other),
        }
    }

    #[test]
    fn default_value_alias_is_accepted() {
        let layer: Layer = serde_json::from_str(
            r#"{"id": 1, "type": "text", "defaultValue": "{{name}}", "style": {"textAlign": "left", "fontWeight": "bold"}}"#,
        )
        .unwrap();
        let LayerKind::Text(text) = &layer.kind else {
            panic!("expected text layer");
        };
        assert_eq!(text.content, "{{name}}");
        assert_eq!(text.style.align, TextAlign::Left);
        assert!(text.style.font_weight.is_bold());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let parsed = serde_json::from_str::<Layer>(r#"{"id": 1, "type": "video"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_id_is_marked_unassigned() {
        let layer: Layer = serde_json::from_str(r#"{"type": "shape"}"#).unwrap();
        assert_eq!(layer.id, LayerId::UNASSIGNED);
        let LayerKind::Shape(shape) = &layer.kind else {
            panic!("expected shape layer");
        };
        assert_eq!(shape.style.geometry, ShapeGeometry::Rectangle);
        assert!(shape.style.fill.is_some());
    }

    #[test]
    fn gradient_stops_spread_evenly_unless_explicit() {
        let gradient = Gradient {
            kind: GradientKind::Linear,
            stops: vec![
                ColorStop { color: Color::BLACK, offset: None },
                ColorStop { color: Color::WHITE, offset: Some(0.25) },
                ColorStop { color: Color::BLACK, offset: None },
            ],
            angle: 0.0,
        };
        let stops: Vec<f32> = gradient.resolved_stops().iter().map(|s| s.0).collect();
        assert_eq!(stops, vec![0.0, 0.25, 1.0]);
    }

    #[test]
    fn layer_round_trips_through_json() {
        let layer = Layer::image(LayerId(7), "seal.png")
            .at(PercentPoint::new(10.0, 90.0))
            .rotated(15.0)
            .with_z(4);
        let json = serde_json::to_string(&layer).unwrap();
        let back: Layer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layer);
    }

    #[test]
    fn display_label_falls_back() {
        let layer = Layer::shape(LayerId(2), ShapeGeometry::Circle);
        assert_eq!(layer.display_label(), "shape 2");
        let layer = layer.named("seal");
        assert_eq!(layer.display_label(), "seal");
    }
}
