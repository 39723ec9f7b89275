use appearance_common::{BakeRegion, ParamId};
use appearance_params::{ParamDef, ParamError};
use appearance_skeleton::{SkeletonDef, SkeletonError};
use appearance_texture::{GlobalColor, LayerSetDef, TextureError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;

/// Errors from loading or validating definitions.
#[derive(Debug, thiserror::Error)]
pub enum DefsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("skeleton: {0}")]
    Skeleton(#[from] SkeletonError),
    #[error("parameters: {0}")]
    Param(#[from] ParamError),
    #[error("texture: {0}")]
    Texture(#[from] TextureError),
    #[error("layer set {0} defined twice")]
    DuplicateRegion(BakeRegion),
    #[error("layer set {region} reads unknown parameter {param}")]
    UnknownParam { region: BakeRegion, param: ParamId },
    #[error("layer set {region} uses unknown global color {name:?}")]
    UnknownGlobalColor { region: BakeRegion, name: String },
}

/// Everything the wearable collaborator supplies for one avatar.
///
/// Persisted as JSON for inspection; the same layout is produced by
/// [`AppearanceDefs::sample`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppearanceDefs {
    pub skeleton: SkeletonDef,
    pub params: Vec<ParamDef>,
    #[serde(default)]
    pub global_colors: Vec<GlobalColor>,
    #[serde(default)]
    pub layer_sets: Vec<LayerSetDef>,
}

impl AppearanceDefs {
    /// Save the definitions to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DefsError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load definitions from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DefsError> {
        let file = std::fs::File::open(path.as_ref())?;
        let defs: Self = serde_json::from_reader(file)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            joints = defs.skeleton.joints.len(),
            params = defs.params.len(),
            layer_sets = defs.layer_sets.len(),
            "appearance definitions loaded"
        );
        Ok(defs)
    }

    /// Cross-reference checks the individual builders cannot make: one set per
    /// region, and every param and global color a layer reads exists.
    pub fn validate(&self) -> Result<(), DefsError> {
        let params: BTreeSet<ParamId> = self.params.iter().map(|p| p.id).collect();
        let colors: BTreeSet<&str> = self.global_colors.iter().map(|c| c.name.as_str()).collect();

        for color in &self.global_colors {
            if let Some(cp) = color.params.iter().find(|cp| !params.contains(&cp.param)) {
                return Err(ParamError::NotFound(cp.param).into());
            }
        }

        let mut regions = BTreeSet::new();
        for set in &self.layer_sets {
            if !regions.insert(set.region) {
                return Err(DefsError::DuplicateRegion(set.region));
            }
            if let Some(param) = set.params().into_iter().find(|p| !params.contains(p)) {
                return Err(DefsError::UnknownParam {
                    region: set.region,
                    param,
                });
            }
            if let Some(name) = set.global_colors().into_iter().find(|n| !colors.contains(n)) {
                return Err(DefsError::UnknownGlobalColor {
                    region: set.region,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Static image names referenced anywhere, for preloading.
    pub fn static_images(&self) -> BTreeSet<&str> {
        self.layer_sets
            .iter()
            .flat_map(|s| s.static_images())
            .collect()
    }

    /// Content hash of the serialized definitions.
    pub fn fingerprint(&self) -> Result<u64, DefsError> {
        let json = serde_json::to_vec(self)?;
        let result = Sha256::digest(&json);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&result[..8]);
        Ok(u64::from_le_bytes(bytes))
    }
}
