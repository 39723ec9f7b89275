//! Skeleton: joint hierarchy with lazily cached world matrices.
//!
//! # Invariants
//! - A joint's cached world matrix, when its matrix bit is clear, equals the
//!   composition of every ancestor's local transform.
//! - A dirty joint implies dirty descendants; `touch` propagates down the tree.
//! - Parent links never form a cycle; reassignment walks ancestors first.
//! - The skeleton arena owns every joint. Parents refer to children by index only.

mod def;
mod joint;
mod skeleton;

pub use def::{JointDef, SkeletonDef};
pub use joint::{DirtyFlags, JointId, JointNode};
pub use skeleton::{Skeleton, SkeletonError};

pub fn crate_info() -> &'static str {
    "appearance-skeleton v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("skeleton"));
    }
}
