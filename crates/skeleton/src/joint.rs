use appearance_common::Transform;
use glam::{Mat4, Quat, Vec3};
use std::fmt;

bitflags::bitflags! {
    /// Which parts of a joint's cached state are stale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        const MATRIX = 1 << 0;
        const ROTATION = 1 << 1;
        const POSITION = 1 << 2;
        const ALL = Self::MATRIX.bits() | Self::ROTATION.bits() | Self::POSITION.bits();
    }
}

/// Index of a joint inside its skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId(pub u32);

impl JointId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint#{}", self.0)
    }
}

/// One node of the skeletal hierarchy.
///
/// Nodes are only mutated through [`Skeleton`](crate::Skeleton), which keeps
/// dirty bits and parent/child links consistent across the tree.
#[derive(Debug, Clone)]
pub struct JointNode {
    pub(crate) name: String,
    pub(crate) parent: Option<JointId>,
    pub(crate) children: Vec<JointId>,
    pub(crate) local: Transform,
    pub(crate) world_matrix: Mat4,
    pub(crate) world_rotation: Quat,
    pub(crate) dirty: DirtyFlags,
}

impl JointNode {
    pub(crate) fn new(name: String, parent: Option<JointId>, local: Transform) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            local,
            world_matrix: Mat4::IDENTITY,
            world_rotation: Quat::IDENTITY,
            dirty: DirtyFlags::ALL,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<JointId> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[JointId] {
        &self.children
    }

    pub fn local(&self) -> &Transform {
        &self.local
    }

    pub fn position(&self) -> Vec3 {
        self.local.position
    }

    pub fn rotation(&self) -> Quat {
        self.local.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.local.scale
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.contains(DirtyFlags::MATRIX)
    }

    /// Recompute the cached world state from the parent's world state.
    pub(crate) fn recompute(&mut self, parent: Option<(Mat4, Quat)>) {
        let local = self.local.to_matrix();
        match parent {
            Some((parent_matrix, parent_rotation)) => {
                self.world_matrix = parent_matrix * local;
                self.world_rotation = parent_rotation * self.local.rotation;
            }
            None => {
                self.world_matrix = local;
                self.world_rotation = self.local.rotation;
            }
        }
        self.dirty = DirtyFlags::empty();
    }
}
