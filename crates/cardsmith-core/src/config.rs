//! Editor and render configuration.
//!
//! Both structs deserialize from JSON with every key optional; absent keys
//! take the documented defaults.

use crate::color::Color;
use serde::{Deserialize, Serialize};

/// Snap/grid settings consumed by the editor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Draw the grid in the preview.
    pub grid_enabled: bool,
    /// Offer grid lines as snap candidates.
    pub snap_to_grid: bool,
    /// Grid spacing in reference-width units.
    pub grid_size: f32,
    /// Snap distance in pixels of the edited surface.
    pub snap_threshold: f32,
    /// Maximum undo depth; `None` keeps every snapshot.
    pub history_limit: Option<usize>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            grid_enabled: true,
            snap_to_grid: true,
            grid_size: 50.0,
            snap_threshold: 10.0,
            history_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// Output resolution tier, as a multiple of the template's native width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityTier {
    pub fn multiplier(self) -> u32 {
        match self {
            QualityTier::Low => 1,
            QualityTier::Medium => 2,
            QualityTier::High => 3,
            QualityTier::Ultra => 4,
        }
    }

    pub fn jpeg_quality(self) -> u8 {
        match self {
            QualityTier::Low => 70,
            QualityTier::Medium => 80,
            QualityTier::High => 90,
            QualityTier::Ultra => 95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub quality: QualityTier,
    /// Flat color drawn when the background image cannot be loaded.
    pub background_fallback: Color,
    /// Per-asset load timeout; `0` disables it.
    pub image_timeout_ms: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: QualityTier::Low,
            background_fallback: Color::WHITE,
            image_timeout_ms: 10_000,
        }
    }
}

impl RenderOptions {
    /// Output width in pixels for a template of `template_width` native pixels.
    pub fn output_width(&self, template_width: u32) -> u32 {
        template_width.saturating_mul(self.quality.multiplier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_editor_config_uses_defaults() {
        let config: EditorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert!(config.grid_enabled && config.snap_to_grid);
        assert_eq!(config.grid_size, 50.0);
        assert_eq!(config.snap_threshold, 10.0);
    }

    #[test]
    fn partial_editor_config_keeps_other_defaults() {
        let config: EditorConfig =
            serde_json::from_str(r#"{"snapToGrid": false, "historyLimit": 20}"#).unwrap();
        assert!(!config.snap_to_grid);
        assert!(config.grid_enabled);
        assert_eq!(config.history_limit, Some(20));
    }

    #[test]
    fn quality_tiers_scale_output() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"quality": "high", "format": "jpg"}"#).unwrap();
        assert_eq!(options.format, OutputFormat::Jpeg);
        assert_eq!(options.output_width(1200), 3600);
        assert_eq!(options.quality.jpeg_quality(), 90);
        assert_eq!(options.background_fallback, Color::WHITE);
    }
}
