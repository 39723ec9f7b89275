//! Appearance definitions: the skeleton, parameter, color, and layer-set data a
//! wearable set supplies, persisted as JSON.
//!
//! # Layout
//! One [`AppearanceDefs`] document per avatar. Builders in the skeleton,
//! params, and texture crates turn each section into live state.

mod defs;
mod sample;

pub use defs::{AppearanceDefs, DefsError};
pub use sample::{
    ARM_THICKNESS, CHEST_WIDTH, HAIR_COLOR, LOWER_PANTS, MUSCULAR, PANTS_LENGTH, SHIRT_LENGTH,
    SHIRT_RED, SKIN_TONE, UPPER_SHIRT,
};

pub fn crate_info() -> &'static str {
    "appearance-assets v0.1.0"
}
