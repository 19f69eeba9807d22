//! Error types.
//!
//! Asset and data problems are recovered where they happen and reported as
//! warnings; the enums here cover the failures that reach a caller.

use crate::layer::LayerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Invalid reference width: {0}")]
    InvalidReferenceWidth(f32),

    #[error("Invalid template dimensions: {width}x{height}")]
    InvalidTemplateSize { width: u32, height: u32 },

    #[error("Duplicate layer id: {0}")]
    DuplicateLayerId(LayerId),

    #[error("Layer id {0} is reserved for the background")]
    ReservedLayerId(LayerId),

    #[error("Failed to parse scene: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error)]
pub enum AssetError {
    #[error("Failed to load asset '{source_ref}': {reason}")]
    Load { source_ref: String, reason: String },

    #[error("Failed to decode image '{source_ref}': {reason}")]
    Decode { source_ref: String, reason: String },

    #[error("Timed out loading asset '{source_ref}' after {millis} ms")]
    Timeout { source_ref: String, millis: u64 },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Output too large: {width}x{height}")]
    OutputTooLarge { width: u32, height: u32 },

    #[error("Invalid render surface: {width}x{height}")]
    InvalidSurface { width: f32, height: f32 },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderingError {
    #[error("The background layer cannot be {0}")]
    BackgroundProtected(&'static str),

    #[error("Layer not found: {0}")]
    NotFound(LayerId),

    #[error("Layer {0} is locked")]
    Locked(LayerId),
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("No drag in progress")]
    NoDrag,

    #[error("Layer {0} is already being dragged")]
    DragInProgress(LayerId),
}
