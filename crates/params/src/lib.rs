//! Visual parameters: weighted appearance controls, and driver parameters that
//! fan one weight out onto dependent parameters.
//!
//! # Invariants
//! - A non-animating parameter's weight always lies in its `[min, max]` range.
//! - A target linked to a live driver is only ever written by that driver.
//! - Every weight change is recorded as a [`ParamEvent`].

mod def;
mod driver;
mod registry;
mod visual;

pub use def::{DrivenLinkDef, ParamDef};
pub use driver::{
    Breakpoints, DrivenEntry, DriverParam, animated_driven_weight, driven_weight,
};
pub use registry::{
    LinkReport, Param, ParamError, ParamEvent, ParamRegistry, SkipReason, SkippedLink,
};
pub use visual::{MorphDistortion, VisualParam, WeightRange};

pub fn crate_info() -> &'static str {
    "appearance-params v0.1.0"
}
