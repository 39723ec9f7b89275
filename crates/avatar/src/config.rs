use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Bake configuration: buffer size, preview policy, and per-pump budgets.
///
/// Every field has a default, so a YAML file only lists what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    /// Width and height of every layer-set buffer, in pixels.
    pub bake_size: u32,
    /// Upload composites built from preview-quality local textures.
    pub upload_preview: bool,
    /// Maximum number of layer sets composited per pump.
    pub compose_budget: usize,
    /// Maximum number of new uploads issued per pump.
    pub upload_budget: usize,
    /// Directory static images are loaded from.
    pub image_root: Option<PathBuf>,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            bake_size: 512,
            upload_preview: false,
            compose_budget: 4,
            upload_budget: 2,
            image_root: None,
        }
    }
}

impl AppearanceConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "appearance config loaded");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bake_size == 0 {
            return Err(ConfigError::Invalid("bake_size must be non-zero".into()));
        }
        if self.compose_budget == 0 {
            return Err(ConfigError::Invalid("compose_budget must be non-zero".into()));
        }
        if self.upload_budget == 0 {
            return Err(ConfigError::Invalid("upload_budget must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AppearanceConfig::default();
        assert_eq!(c.bake_size, 512);
        assert!(!c.upload_preview);
        assert_eq!((c.compose_budget, c.upload_budget), (4, 2));
        c.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let c = AppearanceConfig::from_yaml_str("bake_size: 128\nupload_preview: true\n").unwrap();
        assert_eq!(c.bake_size, 128);
        assert!(c.upload_preview);
        assert_eq!(c.compose_budget, 4);
        assert_eq!(c.image_root, None);
    }

    #[test]
    fn zero_budget_is_invalid() {
        let err = AppearanceConfig::from_yaml_str("upload_budget: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appearance.yaml");
        let config = AppearanceConfig {
            bake_size: 256,
            image_root: Some(PathBuf::from("character")),
            ..AppearanceConfig::default()
        };
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();
        assert_eq!(AppearanceConfig::load(&path).unwrap(), config);
    }
}
