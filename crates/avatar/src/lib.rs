//! Avatar appearance: owns one avatar's skeleton, parameters, colors, and
//! layer sets, routes changes to the layer sets they affect, and pumps
//! recomposite and upload work each frame.
//!
//! # Invariants
//! - A change to a parameter, global color input, local texture, static image,
//!   or visibility invalidates exactly the layer sets that read it.
//! - Each layer set has at most one upload outstanding; changes made while it
//!   is out coalesce into a single follow-up upload.
//! - Completions for cancelled, superseded, or removed uploads are dropped.
//! - Per-pump work never exceeds the configured compose and upload budgets.

mod avatar;
mod config;

pub use avatar::{AppearanceError, AppearanceEvent, AvatarAppearance, PumpStats};
pub use config::{AppearanceConfig, ConfigError};

pub fn crate_info() -> &'static str {
    "appearance-avatar v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("avatar"));
    }
}
