use appearance_common::Transform;
use glam::{Mat4, Quat, Vec3};
use std::collections::BTreeMap;

use crate::joint::{DirtyFlags, JointId, JointNode};

/// Errors from skeleton operations.
#[derive(Debug, thiserror::Error)]
pub enum SkeletonError {
    #[error("unknown joint {0}")]
    UnknownJoint(JointId),
    #[error("joint name already used: {0}")]
    DuplicateName(String),
    #[error("joint {joint:?} references unknown parent {parent:?}")]
    UnknownParent { joint: String, parent: String },
    #[error("parenting {joint:?} under {parent:?} would create a cycle")]
    CyclicParent { joint: String, parent: String },
    #[error("non-finite {field} rejected for joint {joint:?}")]
    NonFinite { joint: String, field: &'static str },
}

/// Arena of joints. Owns every node; nodes refer to each other by [`JointId`].
///
/// Local transforms are written by the animation system; world transforms are
/// recomputed lazily on read and cached until a mutation touches the joint or
/// one of its ancestors.
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    joints: Vec<JointNode>,
    by_name: BTreeMap<String, JointId>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Add a joint under `parent` (or as a root). Returns its id.
    pub fn add_joint(
        &mut self,
        name: impl Into<String>,
        parent: Option<JointId>,
        local: Transform,
    ) -> Result<JointId, SkeletonError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(SkeletonError::DuplicateName(name));
        }
        if let Some(p) = parent {
            self.node(p)?;
        }
        check_finite(&name, "position", local.position.is_finite())?;
        check_finite(&name, "rotation", local.rotation.is_finite())?;
        check_finite(&name, "scale", local.scale.is_finite())?;

        let id = JointId(self.joints.len() as u32);
        self.joints.push(JointNode::new(name.clone(), parent, local));
        self.by_name.insert(name, id);
        if let Some(p) = parent {
            self.joints[p.index()].children.push(id);
        }
        Ok(id)
    }

    pub fn joint(&self, id: JointId) -> Option<&JointNode> {
        self.joints.get(id.index())
    }

    pub fn find(&self, name: &str) -> Option<JointId> {
        self.by_name.get(name).copied()
    }

    /// Iterate over all joints in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &JointNode)> {
        self.joints
            .iter()
            .enumerate()
            .map(|(i, j)| (JointId(i as u32), j))
    }

    pub fn roots(&self) -> Vec<JointId> {
        self.iter()
            .filter(|(_, j)| j.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Reassign `id` under `new_parent`.
    ///
    /// Rejected when `new_parent` is `id` itself or one of its descendants.
    pub fn set_parent(
        &mut self,
        id: JointId,
        new_parent: Option<JointId>,
    ) -> Result<(), SkeletonError> {
        self.node(id)?;
        if let Some(p) = new_parent {
            self.node(p)?;
            if self.is_ancestor_or_self(id, p) {
                let err = SkeletonError::CyclicParent {
                    joint: self.joints[id.index()].name.clone(),
                    parent: self.joints[p.index()].name.clone(),
                };
                tracing::warn!(%err, "rejected parent assignment");
                return Err(err);
            }
        }

        if let Some(old) = self.joints[id.index()].parent {
            self.joints[old.index()].children.retain(|c| *c != id);
        }
        self.joints[id.index()].parent = new_parent;
        if let Some(p) = new_parent {
            self.joints[p.index()].children.push(id);
        }
        self.touch(id, DirtyFlags::ALL);
        Ok(())
    }

    /// Attach `child` under `parent`. Same contract as [`Skeleton::set_parent`].
    pub fn add_child(&mut self, parent: JointId, child: JointId) -> Result<(), SkeletonError> {
        self.set_parent(child, Some(parent))
    }

    /// Detach `child` from `parent`, leaving it as a root. No-op if not a child.
    pub fn remove_child(&mut self, parent: JointId, child: JointId) -> Result<(), SkeletonError> {
        if self.node(child)?.parent != Some(parent) {
            return Ok(());
        }
        self.set_parent(child, None)
    }

    pub fn set_position(&mut self, id: JointId, position: Vec3) -> Result<(), SkeletonError> {
        let node = self.node_mut(id)?;
        check_finite(&node.name, "position", position.is_finite())?;
        node.local.position = position;
        self.touch(id, DirtyFlags::MATRIX | DirtyFlags::POSITION);
        Ok(())
    }

    pub fn set_rotation(&mut self, id: JointId, rotation: Quat) -> Result<(), SkeletonError> {
        let node = self.node_mut(id)?;
        check_finite(&node.name, "rotation", rotation.is_finite())?;
        node.local.rotation = rotation;
        self.touch(id, DirtyFlags::MATRIX | DirtyFlags::ROTATION);
        Ok(())
    }

    pub fn set_scale(&mut self, id: JointId, scale: Vec3) -> Result<(), SkeletonError> {
        let node = self.node_mut(id)?;
        check_finite(&node.name, "scale", scale.is_finite())?;
        node.local.scale = scale;
        self.touch(id, DirtyFlags::ALL);
        Ok(())
    }

    /// Set the position so that the joint lands at `position` in world space.
    pub fn set_world_position(&mut self, id: JointId, position: Vec3) -> Result<(), SkeletonError> {
        let node = self.node(id)?;
        check_finite(&node.name, "position", position.is_finite())?;
        let parent = node.parent;
        let local = match parent {
            Some(p) => self.world_matrix(p)?.inverse().transform_point3(position),
            None => position,
        };
        self.set_position(id, local)
    }

    /// Set the rotation so that the joint's world rotation becomes `rotation`.
    pub fn set_world_rotation(&mut self, id: JointId, rotation: Quat) -> Result<(), SkeletonError> {
        let node = self.node(id)?;
        check_finite(&node.name, "rotation", rotation.is_finite())?;
        let parent = node.parent;
        let local = match parent {
            Some(p) => (self.world_rotation(p)?.inverse() * rotation).normalize(),
            None => rotation,
        };
        self.set_rotation(id, local)
    }

    /// OR `flags` onto a joint and its descendants. Never recomputes.
    ///
    /// A rotation change moves every descendant, so children also receive the
    /// position bit.
    pub fn touch(&mut self, id: JointId, flags: DirtyFlags) {
        let mut stack = vec![(id, flags)];
        while let Some((current, flags)) = stack.pop() {
            let Some(node) = self.joints.get_mut(current.index()) else {
                continue;
            };
            if (node.dirty | flags) == node.dirty {
                continue;
            }
            node.dirty |= flags;
            let mut child_flags = flags;
            if flags.contains(DirtyFlags::ROTATION) {
                child_flags |= DirtyFlags::POSITION;
            }
            stack.extend(node.children.iter().map(|c| (*c, child_flags)));
        }
    }

    /// World matrix of a joint, recomputing stale ancestors first.
    pub fn world_matrix(&mut self, id: JointId) -> Result<Mat4, SkeletonError> {
        self.refresh(id)?;
        Ok(self.joints[id.index()].world_matrix)
    }

    pub fn world_position(&mut self, id: JointId) -> Result<Vec3, SkeletonError> {
        Ok(self.world_matrix(id)?.w_axis.truncate())
    }

    pub fn world_rotation(&mut self, id: JointId) -> Result<Quat, SkeletonError> {
        self.refresh(id)?;
        Ok(self.joints[id.index()].world_rotation)
    }

    /// Cached world matrix without recomputation. May be stale.
    pub fn last_world_matrix(&self, id: JointId) -> Option<Mat4> {
        self.joint(id).map(|j| j.world_matrix)
    }

    /// Cached world position without recomputation. May be stale.
    pub fn last_world_position(&self, id: JointId) -> Option<Vec3> {
        self.last_world_matrix(id).map(|m| m.w_axis.truncate())
    }

    /// Eagerly refresh `id` and every descendant.
    pub fn update_world_matrix_children(&mut self, id: JointId) -> Result<(), SkeletonError> {
        for joint in self.descendants(id)? {
            self.refresh(joint)?;
        }
        Ok(())
    }

    /// `id` followed by all of its descendants, parents before children.
    pub fn descendants(&self, id: JointId) -> Result<Vec<JointId>, SkeletonError> {
        self.node(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.joints[current.index()].children.iter().rev());
        }
        Ok(out)
    }

    fn refresh(&mut self, id: JointId) -> Result<(), SkeletonError> {
        self.node(id)?;
        // Dirty ancestors form a contiguous chain ending at `id`.
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.joints[current.index()];
            if !node.is_dirty() {
                break;
            }
            chain.push(current);
            cursor = node.parent;
        }
        for current in chain.into_iter().rev() {
            let parent = self.joints[current.index()]
                .parent
                .map(|p| {
                    let parent = &self.joints[p.index()];
                    (parent.world_matrix, parent.world_rotation)
                });
            self.joints[current.index()].recompute(parent);
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: JointId, start: JointId) -> bool {
        let mut cursor = Some(start);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.joints.len() {
                return true;
            }
            cursor = self.joints[current.index()].parent;
        }
        false
    }

    fn node(&self, id: JointId) -> Result<&JointNode, SkeletonError> {
        self.joints
            .get(id.index())
            .ok_or(SkeletonError::UnknownJoint(id))
    }

    fn node_mut(&mut self, id: JointId) -> Result<&mut JointNode, SkeletonError> {
        self.joints
            .get_mut(id.index())
            .ok_or(SkeletonError::UnknownJoint(id))
    }
}

fn check_finite(joint: &str, field: &'static str, finite: bool) -> Result<(), SkeletonError> {
    if finite {
        return Ok(());
    }
    let err = SkeletonError::NonFinite {
        joint: joint.to_string(),
        field,
    };
    tracing::warn!(%err, "rejected joint transform");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn at(x: f32, y: f32, z: f32) -> Transform {
        Transform {
            position: Vec3::new(x, y, z),
            ..Transform::default()
        }
    }

    fn chain() -> (Skeleton, JointId, JointId, JointId) {
        let mut s = Skeleton::new();
        let root = s.add_joint("pelvis", None, at(0.0, 0.0, 1.0)).unwrap();
        let torso = s.add_joint("torso", Some(root), at(0.0, 0.0, 0.5)).unwrap();
        let head = s.add_joint("head", Some(torso), at(0.0, 0.1, 0.4)).unwrap();
        (s, root, torso, head)
    }

    #[test]
    fn child_follows_root_rotation_about_vertical_axis() {
        let mut s = Skeleton::new();
        let root = s.add_joint("root", None, Transform::default()).unwrap();
        let child = s.add_joint("child", Some(root), at(0.0, 1.0, 0.0)).unwrap();

        s.set_rotation(root, Quat::from_rotation_z(FRAC_PI_2)).unwrap();
        let p = s.world_position(child).unwrap();
        assert!((p - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5, "got {p:?}");
    }

    #[test]
    fn world_matrix_matches_parent_chain_after_mutations() {
        let (mut s, root, torso, head) = chain();
        s.set_rotation(torso, Quat::from_rotation_x(0.3)).unwrap();
        s.set_scale(root, Vec3::splat(1.5)).unwrap();
        s.set_position(head, Vec3::new(0.2, 0.0, 0.3)).unwrap();
        s.set_rotation(root, Quat::from_rotation_z(-0.7)).unwrap();

        let expected = s.joint(root).unwrap().local().to_matrix()
            * s.joint(torso).unwrap().local().to_matrix()
            * s.joint(head).unwrap().local().to_matrix();
        let actual = s.world_matrix(head).unwrap();
        assert!(actual.abs_diff_eq(expected, 1e-5));

        let parent_world = s.world_matrix(torso).unwrap();
        let local = s.joint(head).unwrap().local().to_matrix();
        assert_eq!(s.world_matrix(head).unwrap(), parent_world * local);
    }

    #[test]
    fn consecutive_reads_are_bit_identical() {
        let (mut s, root, _, head) = chain();
        s.set_rotation(root, Quat::from_rotation_y(0.42)).unwrap();
        let a = s.world_matrix(head).unwrap();
        let b = s.world_matrix(head).unwrap();
        assert_eq!(a.to_cols_array(), b.to_cols_array());
        assert!(!s.joint(head).unwrap().is_dirty());
    }

    #[test]
    fn touch_propagates_to_descendants() {
        let (mut s, root, torso, head) = chain();
        s.world_matrix(head).unwrap();
        assert!(!s.joint(torso).unwrap().is_dirty());

        s.set_rotation(root, Quat::from_rotation_z(0.1)).unwrap();
        assert!(s.joint(root).unwrap().dirty().contains(DirtyFlags::ROTATION));
        let torso_flags = s.joint(torso).unwrap().dirty();
        assert!(torso_flags.contains(DirtyFlags::MATRIX | DirtyFlags::POSITION));
        assert!(s.joint(head).unwrap().is_dirty());
    }

    #[test]
    fn touch_does_not_recompute() {
        let (mut s, root, _, head) = chain();
        let before = s.world_matrix(head).unwrap();
        s.set_position(root, Vec3::new(5.0, 0.0, 0.0)).unwrap();
        assert_eq!(s.last_world_matrix(head), Some(before));
        assert_ne!(s.world_matrix(head).unwrap(), before);
    }

    #[test]
    fn parenting_under_descendant_is_rejected() {
        let (mut s, root, torso, head) = chain();
        let err = s.set_parent(root, Some(head)).unwrap_err();
        assert!(matches!(err, SkeletonError::CyclicParent { .. }));
        assert_eq!(s.joint(root).unwrap().parent(), None);
        assert_eq!(s.joint(torso).unwrap().parent(), Some(root));
    }

    #[test]
    fn parenting_under_self_is_rejected() {
        let (mut s, _, torso, _) = chain();
        assert!(s.set_parent(torso, Some(torso)).is_err());
    }

    #[test]
    fn reparent_updates_child_lists() {
        let (mut s, root, torso, head) = chain();
        s.set_parent(head, Some(root)).unwrap();
        assert!(s.joint(root).unwrap().children().contains(&head));
        assert!(!s.joint(torso).unwrap().children().contains(&head));
        let p = s.world_position(head).unwrap();
        assert!((p - Vec3::new(0.0, 0.1, 1.4)).length() < 1e-5);
    }

    #[test]
    fn remove_child_makes_root() {
        let (mut s, _, torso, head) = chain();
        s.remove_child(torso, head).unwrap();
        assert_eq!(s.joint(head).unwrap().parent(), None);
        assert_eq!(s.roots().len(), 2);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let (mut s, root, _, _) = chain();
        let before = s.joint(root).unwrap().position();
        assert!(s.set_position(root, Vec3::new(f32::NAN, 0.0, 0.0)).is_err());
        assert!(s.set_scale(root, Vec3::splat(f32::INFINITY)).is_err());
        assert!(
            s.set_rotation(root, Quat::from_xyzw(f32::NAN, 0.0, 0.0, 1.0))
                .is_err()
        );
        assert_eq!(s.joint(root).unwrap().position(), before);
        assert_eq!(s.joint(root).unwrap().rotation(), Quat::IDENTITY);
    }

    #[test]
    fn set_world_position_round_trips() {
        let (mut s, root, torso, _) = chain();
        s.set_rotation(root, Quat::from_rotation_z(0.8)).unwrap();
        let target = Vec3::new(2.0, -1.0, 0.5);
        s.set_world_position(torso, target).unwrap();
        assert!((s.world_position(torso).unwrap() - target).length() < 1e-4);
    }

    #[test]
    fn set_world_rotation_round_trips() {
        let (mut s, root, torso, _) = chain();
        s.set_rotation(root, Quat::from_rotation_x(0.5)).unwrap();
        let target = Quat::from_rotation_y(1.1);
        s.set_world_rotation(torso, target).unwrap();
        let actual = s.world_rotation(torso).unwrap();
        assert!(actual.dot(target).abs() > 0.9999);
    }

    #[test]
    fn update_children_clears_all_dirty_bits() {
        let (mut s, root, torso, head) = chain();
        s.update_world_matrix_children(root).unwrap();
        for id in [root, torso, head] {
            assert!(!s.joint(id).unwrap().is_dirty());
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (mut s, root, _, _) = chain();
        assert!(matches!(
            s.add_joint("head", Some(root), Transform::default()),
            Err(SkeletonError::DuplicateName(_))
        ));
        assert_eq!(s.find("torso").map(|id| id.0), Some(1));
    }
}
