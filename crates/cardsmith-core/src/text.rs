//! # Fonts and Text Rasterization
//!
//! ## Key Types
//! - [`FontBook`]: registered font faces by family and weight, shared
//!   read-only between the editor and batch workers.
//! - [`TextRaster`]: coverage of one line of text, with the pen origin and
//!   baseline needed to place it.
//!
//! Layout is single-line: glyphs advance horizontally with kerning and
//! letter spacing, and no line breaking is performed.

use crate::error::AssetError;
use crate::layer::FontWeight;
use fontdue::{Font, FontSettings};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
struct Face {
    family: String,
    weight: FontWeight,
    font: Arc<Font>,
}

#[derive(Clone, Default)]
pub struct FontBook {
    faces: Vec<Face>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.faces.iter().map(|face| (&face.family, face.weight.0)))
            .finish()
    }
}

fn family_key(family: &str) -> String {
    family
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_ascii_lowercase()
}

/// Maps a style suffix such as `Bold` or `700` to a weight.
fn weight_from_suffix(suffix: &str) -> Option<FontWeight> {
    if let Ok(n) = suffix.parse::<u16>() {
        return Some(FontWeight(n));
    }
    let weight = match suffix.to_ascii_lowercase().as_str() {
        "thin" | "hairline" => 100,
        "extralight" | "ultralight" => 200,
        "light" => 300,
        "regular" | "normal" | "book" => 400,
        "medium" => 500,
        "semibold" | "demibold" => 600,
        "bold" => 700,
        "extrabold" | "ultrabold" => 800,
        "black" | "heavy" => 900,
        _ => return None,
    };
    Some(FontWeight(weight))
}

/// Splits a `Family-Weight` file stem.
fn parse_stem(stem: &str) -> (String, FontWeight) {
    if let Some((family, suffix)) = stem.rsplit_once('-') {
        if let Some(weight) = weight_from_suffix(suffix) {
            return (family.to_string(), weight);
        }
    }
    (stem.to_string(), FontWeight::NORMAL)
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        family: &str,
        weight: FontWeight,
        bytes: &[u8],
    ) -> Result<(), AssetError> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|reason| {
            AssetError::Decode {
                source_ref: family.to_string(),
                reason: reason.to_string(),
            }
        })?;
        tracing::debug!("Registered font '{}' weight {}", family, weight.0);
        self.faces.push(Face {
            family: family_key(family),
            weight,
            font: Arc::new(font),
        });
        Ok(())
    }

    /// Registers every `.ttf`/`.otf` file in `dir`, named `Family-Weight.ext`
    /// (e.g. `Inter-Bold.ttf`). Files that fail to parse are skipped with a
    /// warning. Returns the number of faces added.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, AssetError> {
        let dir = dir.as_ref();
        let load_err = |reason: String| AssetError::Load {
            source_ref: dir.display().to_string(),
            reason,
        };

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| load_err(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"))
            })
            .collect();
        paths.sort();

        let mut added = 0;
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let (family, weight) = parse_stem(stem);
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Skipping font {}: {}", path.display(), e);
                    continue;
                }
            };
            match self.register(&family, weight, &bytes) {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!("Skipping font {}: {}", path.display(), e),
            }
        }
        Ok(added)
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn families(&self) -> Vec<String> {
        let mut families: Vec<String> = Vec::new();
        for face in &self.faces {
            if !families.contains(&face.family) {
                families.push(face.family.clone());
            }
        }
        families
    }

    fn closest_weight<'a>(faces: impl Iterator<Item = &'a Face>, weight: FontWeight) -> Option<&'a Face> {
        faces.min_by_key(|face| (face.weight.0 as i32 - weight.0 as i32).abs())
    }

    /// Best face for a CSS-style family list, falling back to the first
    /// registered family. `None` only when the book is empty.
    pub fn resolve(&self, family: &str, weight: FontWeight) -> Option<&Font> {
        for candidate in family.split(',').map(family_key) {
            let matched = Self::closest_weight(
                self.faces.iter().filter(|face| face.family == candidate),
                weight,
            );
            if let Some(face) = matched {
                return Some(face.font.as_ref());
            }
        }

        let first = self.faces.first()?;
        tracing::debug!("Font '{}' not registered; using '{}'", family, first.family);
        Self::closest_weight(
            self.faces.iter().filter(|face| face.family == first.family),
            weight,
        )
        .map(|face| face.font.as_ref())
    }
}

/// Coverage of one rasterized line.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRaster {
    pub width: usize,
    pub height: usize,
    /// `width * height` coverage values, row-major.
    pub coverage: Vec<u8>,
    /// Pen start within the buffer.
    pub origin_x: i32,
    /// Baseline within the buffer.
    pub baseline: i32,
    /// Logical width of the line (sum of advances).
    pub advance: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl TextRaster {
    /// Height of the line box (`ascent - descent`).
    pub fn line_height(&self) -> f32 {
        self.ascent - self.descent
    }
}

pub fn rasterize_line(font: &Font, text: &str, size: f32, letter_spacing: f32) -> TextRaster {
    let (ascent, descent) = font
        .horizontal_line_metrics(size)
        .map(|m| (m.ascent, m.descent))
        .unwrap_or((size * 0.8, -size * 0.2));

    let mut glyphs = Vec::new();
    let mut pen = 0.0f32;
    let mut prev: Option<char> = None;
    for ch in text.chars() {
        if let Some(p) = prev {
            pen += font.horizontal_kern(p, ch, size).unwrap_or(0.0);
        }
        let (metrics, bitmap) = font.rasterize(ch, size);
        let x = (pen + metrics.xmin as f32).round() as i32;
        // Offset of the bitmap top from the baseline, downwards positive.
        let y = -(metrics.ymin + metrics.height as i32);
        glyphs.push((x, y, metrics.width, metrics.height, bitmap));
        pen += metrics.advance_width + letter_spacing;
        prev = Some(ch);
    }
    if !glyphs.is_empty() {
        pen -= letter_spacing;
    }
    let advance = pen.max(0.0);

    let mut min_x = 0;
    let mut max_x = advance.ceil() as i32;
    let mut min_y = -ascent.ceil() as i32;
    let mut max_y = (-descent).ceil() as i32;
    for (x, y, w, h, _) in &glyphs {
        min_x = min_x.min(*x);
        max_x = max_x.max(x + *w as i32);
        min_y = min_y.min(*y);
        max_y = max_y.max(y + *h as i32);
    }

    let origin_x = -min_x;
    let baseline = -min_y;
    let width = (max_x - min_x).max(0) as usize;
    let height = (max_y - min_y).max(0) as usize;
    let mut coverage = vec![0u8; width * height];

    for (x, y, w, h, bitmap) in glyphs {
        let left = (x + origin_x) as usize;
        let top = (y + baseline) as usize;
        for gy in 0..h {
            for gx in 0..w {
                let value = bitmap[gy * w + gx];
                if value == 0 {
                    continue;
                }
                let dst = &mut coverage[(top + gy) * width + left + gx];
                *dst = (*dst).max(value);
            }
        }
    }

    TextRaster {
        width,
        height,
        coverage,
        origin_x,
        baseline,
        advance,
        ascent,
        descent,
    }
}
