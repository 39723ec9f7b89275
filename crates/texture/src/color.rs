use appearance_common::ParamId;
use appearance_params::ParamRegistry;
use glam::Vec4;
use serde::{Deserialize, Serialize};

/// How a color param combines with the color accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorOperation {
    Add,
    Multiply,
    Blend,
}

/// A visual param whose weight selects a color along a gradient of stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorParam {
    pub param: ParamId,
    pub operation: ColorOperation,
    pub colors: Vec<Vec4>,
}

impl ColorParam {
    pub fn new(param: ParamId, operation: ColorOperation, colors: Vec<Vec4>) -> Self {
        Self {
            param,
            operation,
            colors,
        }
    }

    /// Color at normalized weight `w`. A single stop is scaled by the weight.
    pub fn color_at(&self, w: f32) -> Vec4 {
        let w = w.clamp(0.0, 1.0);
        match self.colors.as_slice() {
            [] => Vec4::ZERO,
            [only] => *only * w,
            stops => {
                let scaled = w * (stops.len() - 1) as f32;
                let index = (scaled.floor() as usize).min(stops.len() - 2);
                let t = scaled - index as f32;
                stops[index].lerp(stops[index + 1], t)
            }
        }
    }

    /// Combine this param's color into `base`.
    pub fn apply(&self, base: Vec4, w: f32) -> Vec4 {
        let color = self.color_at(w);
        match self.operation {
            ColorOperation::Add => base + color,
            ColorOperation::Multiply => base * color,
            ColorOperation::Blend => base.lerp(color, w.clamp(0.0, 1.0)),
        }
    }
}

/// Normalized weight of `id`, or zero when it is not registered.
pub(crate) fn normalized_weight(params: &ParamRegistry, id: ParamId) -> f32 {
    params
        .visual(id)
        .map(|p| p.normalized_weight())
        .unwrap_or(0.0)
}

/// Fold `color_params` over `base` in declaration order.
pub fn combine(params: &ParamRegistry, base: Vec4, color_params: &[ColorParam]) -> Vec4 {
    color_params.iter().fold(base, |acc, cp| {
        cp.apply(acc, normalized_weight(params, cp.param))
    })
}

/// Named color shared between layers (skin, hair, eyes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalColor {
    pub name: String,
    pub params: Vec<ColorParam>,
}

impl GlobalColor {
    pub fn new(name: impl Into<String>, params: Vec<ColorParam>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Params combined starting from transparent black.
    pub fn evaluate(&self, params: &ParamRegistry) -> Vec4 {
        combine(params, Vec4::ZERO, &self.params)
    }

    pub fn depends_on(&self, id: ParamId) -> bool {
        self.params.iter().any(|p| p.param == id)
    }
}
