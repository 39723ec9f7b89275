//! Developer tooling: read-only inspection of an avatar's appearance state.
//!
//! # Invariants
//! - Inspection never mutates the avatar or forces world-matrix updates.

mod inspector;

pub use inspector::{AppearanceInspector, AppearanceSummary, JointInfo, LayerSetInfo, ParamInfo};

pub fn crate_info() -> &'static str {
    "appearance-tools v0.1.0"
}
