use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a visual parameter, unique within one avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub u32);

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param#{}", self.0)
    }
}

/// Identifier assigned by the remote asset service to a stored bake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub Uuid);

impl AssetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlation id of one upload request. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadId(pub u64);

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload#{}", self.0)
    }
}

/// Body region a layer set bakes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BakeRegion {
    Head,
    UpperBody,
    LowerBody,
    Eyes,
    Skirt,
    Hair,
}

impl BakeRegion {
    pub const ALL: [BakeRegion; 6] = [
        BakeRegion::Head,
        BakeRegion::UpperBody,
        BakeRegion::LowerBody,
        BakeRegion::Eyes,
        BakeRegion::Skirt,
        BakeRegion::Hair,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BakeRegion::Head => "head",
            BakeRegion::UpperBody => "upper_body",
            BakeRegion::LowerBody => "lower_body",
            BakeRegion::Eyes => "eyes",
            BakeRegion::Skirt => "skirt",
            BakeRegion::Hair => "hair",
        }
    }
}

impl fmt::Display for BakeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named slot a wearable fills with a local texture (e.g. `upper_shirt`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalTextureSlot(pub String);

impl LocalTextureSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for LocalTextureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether pixel data (or a composite built from it) is durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureQuality {
    /// Best-available data; must be redone once final data arrives.
    Preview,
    Final,
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    /// Local matrix composed as translation * rotation * scale.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_uniqueness() {
        let a = AssetId::new();
        let b = AssetId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn region_order_is_stable() {
        let mut regions = BakeRegion::ALL.to_vec();
        regions.sort();
        assert_eq!(regions, BakeRegion::ALL.to_vec());
        assert_eq!(BakeRegion::UpperBody.to_string(), "upper_body");
    }

    #[test]
    fn preview_sorts_before_final() {
        assert!(TextureQuality::Preview < TextureQuality::Final);
    }
}
