//! Texture layers: per-region layer stacks composited into baked RGBA8 buffers,
//! and the buffer state machine that tracks their upload.
//!
//! # Invariants
//! - Compositing is pure in its inputs; identical inputs give identical bytes.
//! - A layer set has at most one upload in flight. Changes arriving meanwhile
//!   coalesce into exactly one follow-up upload.
//! - Upload requests carry a snapshot, so recompositing never races an upload.
//! - Completions are matched by correlation id; anything else is stale.

mod buffer;
mod color;
mod compose;
mod image_cache;
mod layer;
mod layer_set;
mod raster;
mod upload;

pub use buffer::{BufferState, CompletionResult, LayerSetBuffer, UploadDecision, UploadRecord};
pub use color::{ColorOperation, ColorParam, GlobalColor, combine};
pub use compose::{ComposeContext, Composite, compose};
pub use image_cache::ImageCache;
pub use layer::{AlphaParam, ColorBase, LayerBlend, LayerSource, MaskSource, TextureLayer};
pub use layer_set::{LayerSetDef, TextureLayerSet};
pub use raster::{LocalTexture, PixelDigest, Raster, Rgba8, TextureError};
pub use upload::{
    AssetUploader, LoopbackUploader, UploadCompleter, UploadCompletion, UploadOutcome,
    UploadQueue, UploadRequest,
};

pub fn crate_info() -> &'static str {
    "appearance-texture v0.1.0"
}
