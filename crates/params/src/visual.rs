use appearance_common::ParamId;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Inclusive `[min, max]` weight range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightRange {
    pub min: f32,
    pub max: f32,
}

impl WeightRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Position of `value` inside the range, in `[0, 1]`.
    pub fn normalize(&self, value: f32) -> f32 {
        if self.max > self.min {
            ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Per-vertex displacement a shape parameter applies at full weight.
///
/// Only the summary queries are provided here; the skinning collaborator owns
/// the actual deformation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorphDistortion {
    pub deltas: Vec<Vec3>,
}

impl MorphDistortion {
    pub fn new(deltas: Vec<Vec3>) -> Self {
        Self { deltas }
    }

    /// Sum of displacement lengths.
    pub fn total(&self) -> f32 {
        self.deltas.iter().map(|d| d.length()).sum()
    }

    /// Mean absolute displacement per axis.
    pub fn average(&self) -> Vec3 {
        if self.deltas.is_empty() {
            return Vec3::ZERO;
        }
        let sum: Vec3 = self.deltas.iter().map(|d| d.abs()).sum();
        sum / self.deltas.len() as f32
    }

    /// Longest single displacement.
    pub fn max(&self) -> f32 {
        self.deltas
            .iter()
            .map(|d| d.length())
            .fold(0.0, f32::max)
    }

    pub fn vertex(&self, index: usize) -> Vec3 {
        self.deltas.get(index).copied().unwrap_or(Vec3::ZERO)
    }
}

/// A named scalar appearance control.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualParam {
    id: ParamId,
    name: String,
    range: WeightRange,
    default_weight: f32,
    weight: f32,
    animating: bool,
    last_weight: f32,
    target_weight: f32,
    distortion: Option<MorphDistortion>,
}

impl VisualParam {
    /// Create a parameter at its default weight. The default is clamped into range.
    ///
    /// Returns `None` when the range is inverted or not finite.
    pub fn new(id: ParamId, name: impl Into<String>, min: f32, max: f32, default: f32) -> Option<Self> {
        if !(min.is_finite() && max.is_finite() && default.is_finite()) || min > max {
            return None;
        }
        let range = WeightRange::new(min, max);
        let default_weight = range.clamp(default);
        Some(Self {
            id,
            name: name.into(),
            range,
            default_weight,
            weight: default_weight,
            animating: false,
            last_weight: default_weight,
            target_weight: default_weight,
            distortion: None,
        })
    }

    pub fn with_distortion(mut self, distortion: MorphDistortion) -> Self {
        self.distortion = Some(distortion);
        self
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> WeightRange {
        self.range
    }

    pub fn min(&self) -> f32 {
        self.range.min
    }

    pub fn max(&self) -> f32 {
        self.range.max
    }

    pub fn default_weight(&self) -> f32 {
        self.default_weight
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Weight mapped into `[0, 1]` across the parameter's range.
    pub fn normalized_weight(&self) -> f32 {
        self.range.normalize(self.weight)
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub fn target_weight(&self) -> f32 {
        self.target_weight
    }

    pub fn distortion(&self) -> Option<&MorphDistortion> {
        self.distortion.as_ref()
    }

    /// Store a new weight. Clamped unless animating, where overshoot is kept.
    ///
    /// Returns whether the stored weight changed. Non-finite input is ignored.
    pub fn set_weight(&mut self, weight: f32) -> bool {
        if !weight.is_finite() {
            tracing::warn!(param = %self.id, weight, "ignoring non-finite weight");
            return false;
        }
        let next = if self.animating {
            weight
        } else {
            self.range.clamp(weight)
        };
        let changed = next != self.weight;
        self.weight = next;
        changed
    }

    pub(crate) fn set_animating(&mut self, animating: bool) {
        self.animating = animating;
    }

    /// Begin interpolating from the current weight towards `target` (clamped).
    pub(crate) fn start_animation(&mut self, target: f32) {
        self.last_weight = self.weight;
        self.target_weight = self.range.clamp(target);
        self.animating = true;
    }

    /// Weight `delta` of the way from the animation start to its target.
    pub(crate) fn interpolated(&self, delta: f32) -> f32 {
        self.last_weight + (self.target_weight - self.last_weight) * delta
    }

    /// Leave animation mode; returns the weight to settle on.
    pub(crate) fn stop_animation(&mut self) -> f32 {
        self.animating = false;
        self.target_weight
    }
}
