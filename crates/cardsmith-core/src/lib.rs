//! # Cardsmith Core
//!
//! Composes certificate/card templates out of a background image and a stack
//! of positioned text, image and shape layers, and renders them in two
//! places that must agree on layout:
//!
//! - the interactive [`editor`] (preview surface at on-screen zoom, with
//!   drag/snap/guideline feedback and undo/redo), and
//! - the headless [`batch`] rasterizer (full output resolution, many rows of
//!   form data, no chrome).
//!
//! Both targets share the [`normalize::Normalizer`] and the
//! [`layout::resolve`] function, and draw every layer through the same
//! [`render::Drawable`] implementations.

pub mod assets;
pub mod batch;
pub mod color;
pub mod config;
pub mod editor;
pub mod effects;
pub mod error;
pub mod history;
pub mod layer;
pub mod layout;
pub mod normalize;
pub mod ordering;
pub mod placeholder;
pub mod render;
pub mod scene;
pub mod snap;
pub mod text;

pub use assets::{ImageCache, TimeoutLoader};
pub use batch::{run_batch, BatchJob, CancelToken, JobOutcome};
pub use color::Color;
pub use config::{EditorConfig, OutputFormat, QualityTier, RenderOptions};
pub use editor::EditorSession;
pub use error::{AssetError, EditorError, OrderingError, RenderError, SceneError};
pub use history::History;
pub use layer::{Layer, LayerId, LayerKind};
pub use layout::{resolve, Placement};
pub use normalize::{Normalizer, PercentPoint, PixelPoint, Surface};
pub use placeholder::{substitute, FormData};
pub use render::{compose, PreviewTarget, RasterTarget, RenderReport, RenderTarget};
pub use scene::{Background, Scene, REFERENCE_WIDTH};
pub use snap::{Guideline, SnapClass, SnapResult};
pub use text::FontBook;

/// Resolves asset references (paths or URLs) to raw bytes.
///
/// Implementations must be shareable across batch worker threads.
pub trait AssetLoader: Send + Sync {
    fn load_bytes(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// Loads assets from the local filesystem. A `file://` prefix is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAssetLoader;

impl AssetLoader for DefaultAssetLoader {
    fn load_bytes(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        use anyhow::Context;

        let path = path.strip_prefix("file://").unwrap_or(path);
        std::fs::read(path).with_context(|| format!("Failed to read asset: {}", path))
    }
}
