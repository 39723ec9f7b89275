use appearance_common::Transform;
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::skeleton::{Skeleton, SkeletonError};

/// Serializable description of one joint. Rotation is XYZ Euler in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation_degrees: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl JointDef {
    pub fn new(name: impl Into<String>, parent: Option<&str>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(str::to_string),
            position,
            rotation_degrees: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    fn transform(&self) -> Transform {
        let r = self.rotation_degrees;
        Transform {
            position: self.position,
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                r.x.to_radians(),
                r.y.to_radians(),
                r.z.to_radians(),
            ),
            scale: self.scale,
        }
    }
}

/// Serializable skeleton layout. Parents must be listed before their children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkeletonDef {
    pub joints: Vec<JointDef>,
}

impl SkeletonDef {
    pub fn build(&self) -> Result<Skeleton, SkeletonError> {
        let mut skeleton = Skeleton::new();
        for def in &self.joints {
            let parent = match &def.parent {
                Some(name) => Some(skeleton.find(name).ok_or_else(|| {
                    SkeletonError::UnknownParent {
                        joint: def.name.clone(),
                        parent: name.clone(),
                    }
                })?),
                None => None,
            };
            skeleton.add_joint(def.name.clone(), parent, def.transform())?;
        }
        tracing::debug!(joints = skeleton.len(), "skeleton built");
        Ok(skeleton)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn biped() -> SkeletonDef {
        SkeletonDef {
            joints: vec![
                JointDef::new("mPelvis", None, Vec3::new(0.0, 0.0, 1.067)),
                JointDef::new("mTorso", Some("mPelvis"), Vec3::new(0.0, 0.0, 0.084)),
                JointDef::new("mChest", Some("mTorso"), Vec3::new(-0.015, 0.0, 0.205)),
                JointDef::new("mHead", Some("mChest"), Vec3::new(0.0, 0.0, 0.327)),
            ],
        }
    }

    #[test]
    fn build_links_parents_by_name() {
        let mut s = biped().build().unwrap();
        assert_eq!(s.len(), 4);
        let head = s.find("mHead").unwrap();
        let p = s.world_position(head).unwrap();
        assert!((p - Vec3::new(-0.015, 0.0, 1.683)).length() < 1e-5);
    }

    #[test]
    fn unknown_parent_is_an_error() {
        let def = SkeletonDef {
            joints: vec![JointDef::new("mHead", Some("mNeck"), Vec3::ZERO)],
        };
        assert!(matches!(
            def.build(),
            Err(SkeletonError::UnknownParent { .. })
        ));
    }

    #[test]
    fn scale_defaults_to_one_when_omitted() {
        let json = r#"{"joints":[{"name":"mPelvis","position":[0.0,0.0,1.0]}]}"#;
        let def: SkeletonDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.joints[0].scale, Vec3::ONE);
        assert_eq!(def.joints[0].parent, None);
    }
}
