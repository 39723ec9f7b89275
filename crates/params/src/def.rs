use appearance_common::ParamId;
use serde::{Deserialize, Serialize};

use crate::driver::{Breakpoints, DrivenEntry};
use crate::registry::{LinkReport, ParamError, ParamRegistry};
use crate::visual::{MorphDistortion, VisualParam};

/// Serializable link from a driver to one target. Omitted breakpoints mean a
/// plain ramp across the driver's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivenLinkDef {
    pub target: ParamId,
    #[serde(default)]
    pub breakpoints: Option<Breakpoints>,
}

/// Serializable parameter definition. A definition with links is a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: String,
    pub min: f32,
    pub max: f32,
    #[serde(default)]
    pub default: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drives: Vec<DrivenLinkDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion: Option<MorphDistortion>,
}

impl ParamDef {
    pub fn new(id: u32, name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        Self {
            id: ParamId(id),
            name: name.into(),
            min,
            max,
            default,
            drives: Vec::new(),
            distortion: None,
        }
    }

    pub fn driving(mut self, target: u32, breakpoints: Option<Breakpoints>) -> Self {
        self.drives.push(DrivenLinkDef {
            target: ParamId(target),
            breakpoints,
        });
        self
    }

    pub fn is_driver(&self) -> bool {
        !self.drives.is_empty()
    }

    fn to_param(&self) -> Result<VisualParam, ParamError> {
        let param = VisualParam::new(self.id, self.name.clone(), self.min, self.max, self.default)
            .ok_or(ParamError::InvalidRange {
                id: self.id,
                min: self.min,
                max: self.max,
            })?;
        Ok(match &self.distortion {
            Some(d) => param.with_distortion(d.clone()),
            None => param,
        })
    }
}

impl ParamRegistry {
    /// Build a registry from definitions and resolve every driver link.
    pub fn from_defs(defs: &[ParamDef]) -> Result<(Self, LinkReport), ParamError> {
        let mut registry = Self::new();
        registry.extend_from_defs(defs)?;
        let report = registry.link_drivers();
        Ok((registry, report))
    }

    /// Register definitions without resolving links.
    pub fn extend_from_defs(&mut self, defs: &[ParamDef]) -> Result<(), ParamError> {
        for def in defs {
            let param = def.to_param()?;
            if def.is_driver() {
                let range = param.range();
                let links: Vec<DrivenEntry> = def
                    .drives
                    .iter()
                    .map(|link| DrivenEntry {
                        target: link.target,
                        breakpoints: link
                            .breakpoints
                            .unwrap_or_else(|| Breakpoints::full_range(range)),
                    })
                    .collect();
                self.add_driver(param, links)?;
            } else {
                self.add_visual(param)?;
            }
        }
        Ok(())
    }
}
