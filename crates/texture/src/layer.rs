use appearance_common::{LocalTextureSlot, ParamId};
use appearance_params::ParamRegistry;
use glam::Vec4;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::color::{ColorParam, GlobalColor, combine, normalized_weight};

/// Where a layer's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSource {
    LocalTexture(LocalTextureSlot),
    StaticImage(String),
    /// Flat net color.
    Color,
}

/// The single base source of a masked layer's alpha.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskSource {
    LocalTexture(LocalTextureSlot),
    StaticImage(String),
    Visibility(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerBlend {
    /// Replace all four channels.
    DirectWrite,
    Masked(MaskSource),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorBase {
    Global(String),
    Fixed(Vec4),
}

fn default_domain() -> f32 {
    0.05
}

/// A visual param shaping a layer's mask, uniformly or through a gradient image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaParam {
    pub param: ParamId,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_domain")]
    pub domain: f32,
    #[serde(default)]
    pub multiply_blend: bool,
    #[serde(default)]
    pub skip_if_zero: bool,
}

impl AlphaParam {
    pub fn uniform(param: ParamId) -> Self {
        Self {
            param,
            image: None,
            domain: default_domain(),
            multiply_blend: false,
            skip_if_zero: false,
        }
    }

    pub fn gradient(param: ParamId, image: impl Into<String>, domain: f32) -> Self {
        Self {
            image: Some(image.into()),
            domain,
            ..Self::uniform(param)
        }
    }

    /// Remap a gradient sample `v` (0..=255) for normalized weight `w`.
    pub fn gradient_lookup(&self, v: u8, w: f32) -> f32 {
        let domain = self.domain.max(f32::EPSILON);
        let threshold = (1.0 - domain) * (1.0 - w).clamp(0.0, 1.0);
        ((v as f32 / 255.0 - threshold) / domain).clamp(0.0, 1.0)
    }

    pub(crate) fn is_skipped(&self, params: &ParamRegistry) -> bool {
        self.skip_if_zero && normalized_weight(params, self.param) <= 0.001
    }
}

/// One contribution to a layer set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureLayer {
    pub name: String,
    pub source: LayerSource,
    pub blend: LayerBlend,
    #[serde(default)]
    pub color_base: Option<ColorBase>,
    #[serde(default)]
    pub color_params: Vec<ColorParam>,
    #[serde(default)]
    pub alpha_params: Vec<AlphaParam>,
    /// Accumulates into the set's morph mask.
    #[serde(default)]
    pub morph: bool,
}

impl TextureLayer {
    pub fn new(name: impl Into<String>, source: LayerSource, blend: LayerBlend) -> Self {
        Self {
            name: name.into(),
            source,
            blend,
            color_base: None,
            color_params: Vec::new(),
            alpha_params: Vec::new(),
            morph: false,
        }
    }

    pub fn with_color_base(mut self, base: ColorBase) -> Self {
        self.color_base = Some(base);
        self
    }

    pub fn with_color_param(mut self, param: ColorParam) -> Self {
        self.color_params.push(param);
        self
    }

    pub fn with_alpha_param(mut self, param: AlphaParam) -> Self {
        self.alpha_params.push(param);
        self
    }

    pub fn morph_contributor(mut self) -> Self {
        self.morph = true;
        self
    }

    /// Every param this layer reads directly.
    pub fn params(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.color_params
            .iter()
            .map(|c| c.param)
            .chain(self.alpha_params.iter().map(|a| a.param))
    }

    pub fn global_color(&self) -> Option<&str> {
        match &self.color_base {
            Some(ColorBase::Global(name)) => Some(name),
            _ => None,
        }
    }

    /// Local texture slots read by the source or the mask.
    pub fn local_slots(&self) -> impl Iterator<Item = &LocalTextureSlot> + '_ {
        let source = match &self.source {
            LayerSource::LocalTexture(slot) => Some(slot),
            _ => None,
        };
        let mask = match &self.blend {
            LayerBlend::Masked(MaskSource::LocalTexture(slot)) => Some(slot),
            _ => None,
        };
        source.into_iter().chain(mask)
    }

    /// Static image names read by the source, the mask, or alpha gradients.
    pub fn static_images(&self) -> impl Iterator<Item = &str> + '_ {
        let source = match &self.source {
            LayerSource::StaticImage(name) => Some(name.as_str()),
            _ => None,
        };
        let mask = match &self.blend {
            LayerBlend::Masked(MaskSource::StaticImage(name)) => Some(name.as_str()),
            _ => None,
        };
        source
            .into_iter()
            .chain(mask)
            .chain(self.alpha_params.iter().filter_map(|a| a.image.as_deref()))
    }

    /// The layer's net color, and whether any color source was declared.
    ///
    /// Color params combine on top of the global or fixed base. Without params
    /// the global color, then a fixed color with non-zero alpha, then white applies.
    pub fn net_color(
        &self,
        params: &ParamRegistry,
        globals: &BTreeMap<String, GlobalColor>,
    ) -> (Vec4, bool) {
        let global = |name: &str| match globals.get(name) {
            Some(g) => g.evaluate(params),
            None => {
                tracing::warn!(layer = %self.name, color = name, "unknown global color");
                Vec4::ZERO
            }
        };
        let fixed = match &self.color_base {
            Some(ColorBase::Fixed(c)) if c.w != 0.0 => Some(*c),
            _ => None,
        };

        if !self.color_params.is_empty() {
            let base = match (&self.color_base, fixed) {
                (Some(ColorBase::Global(name)), _) => global(name.as_str()),
                (_, Some(c)) => c,
                _ => Vec4::ZERO,
            };
            let color = combine(params, base, &self.color_params);
            return (color.clamp(Vec4::ZERO, Vec4::ONE), true);
        }
        if let Some(name) = self.global_color() {
            return (global(name).clamp(Vec4::ZERO, Vec4::ONE), true);
        }
        if let Some(c) = fixed {
            return (c.clamp(Vec4::ZERO, Vec4::ONE), true);
        }
        (Vec4::ONE, false)
    }
}
