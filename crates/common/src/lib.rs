//! Shared types used across the appearance crates.

mod types;

pub use types::{
    AssetId, BakeRegion, LocalTextureSlot, ParamId, TextureQuality, Transform, UploadId,
};

pub fn crate_info() -> &'static str {
    "appearance-common v0.1.0"
}
