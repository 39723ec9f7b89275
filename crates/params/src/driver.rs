use appearance_common::ParamId;
use serde::{Deserialize, Serialize};

use crate::visual::{VisualParam, WeightRange};

/// Piecewise-linear breakpoints `min1 <= max1 <= max2 <= min2` in driver space.
///
/// The driven weight rises from the driven minimum at `min1` to the driven
/// maximum at `max1`, holds until `max2`, then falls back to the minimum at `min2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoints {
    pub min1: f32,
    pub max1: f32,
    pub max2: f32,
    pub min2: f32,
}

impl Breakpoints {
    pub fn new(min1: f32, max1: f32, max2: f32, min2: f32) -> Self {
        Self {
            min1,
            max1,
            max2,
            min2,
        }
    }

    /// A plain rising ramp over the driver's whole range.
    pub fn full_range(driver: WeightRange) -> Self {
        Self::new(driver.min, driver.max, driver.max, driver.max)
    }

    pub fn is_ordered(&self) -> bool {
        let values = [self.min1, self.max1, self.max2, self.min2];
        values.iter().all(|v| v.is_finite())
            && self.min1 <= self.max1
            && self.max1 <= self.max2
            && self.max2 <= self.min2
    }
}

/// One link from a driver to a dependent parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivenEntry {
    pub target: ParamId,
    pub breakpoints: Breakpoints,
}

/// Map a driver weight onto a driven weight.
///
/// Boundary handling compares breakpoints against the driver's absolute bounds
/// with exact equality.
pub fn driven_weight(
    breakpoints: &Breakpoints,
    driver: WeightRange,
    driven: WeightRange,
    input: f32,
) -> f32 {
    let Breakpoints {
        min1,
        max1,
        max2,
        min2,
    } = *breakpoints;

    if input <= min1 {
        if min1 == max1 && min1 == driver.min {
            driven.max
        } else {
            driven.min
        }
    } else if input <= max1 {
        let t = (input - min1) / (max1 - min1);
        driven.min + t * (driven.max - driven.min)
    } else if input <= max2 {
        driven.max
    } else if input <= min2 {
        let t = (input - max2) / (min2 - max2);
        driven.max + t * (driven.min - driven.max)
    } else if min2 == driver.max {
        driven.max
    } else {
        driven.min
    }
}

/// Mapping used while the driver animates and may overshoot its range.
///
/// Below `min1` (when `min1` is the driver's absolute minimum) the rising segment
/// is extrapolated, or held at the driven maximum when that segment is degenerate.
/// Above `min2` the falling segment is treated the same way against the
/// absolute maximum. Everything else uses [`driven_weight`].
pub fn animated_driven_weight(
    breakpoints: &Breakpoints,
    driver: WeightRange,
    driven: WeightRange,
    input: f32,
) -> f32 {
    let Breakpoints {
        min1,
        max1,
        max2,
        min2,
    } = *breakpoints;

    if input < min1 && min1 == driver.min {
        if min1 == max1 {
            driven.max
        } else {
            let t = (input - min1) / (max1 - min1);
            driven.min + t * (driven.max - driven.min)
        }
    } else if input > min2 && min2 == driver.max {
        if max2 == min2 {
            driven.max
        } else {
            let t = (input - max2) / (min2 - max2);
            driven.max + t * (driven.min - driven.max)
        }
    } else {
        driven_weight(breakpoints, driver, driven, input)
    }
}

/// A visual parameter whose weight fans out onto linked targets.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverParam {
    param: VisualParam,
    driven: Vec<DrivenEntry>,
}

impl DriverParam {
    pub fn new(param: VisualParam) -> Self {
        Self {
            param,
            driven: Vec::new(),
        }
    }

    pub fn param(&self) -> &VisualParam {
        &self.param
    }

    pub(crate) fn param_mut(&mut self) -> &mut VisualParam {
        &mut self.param
    }

    pub fn id(&self) -> ParamId {
        self.param.id()
    }

    pub fn weight(&self) -> f32 {
        self.param.weight()
    }

    /// Linked entries in link order.
    pub fn driven(&self) -> &[DrivenEntry] {
        &self.driven
    }

    pub fn drives(&self, target: ParamId) -> bool {
        self.driven.iter().any(|e| e.target == target)
    }

    /// Add or replace the link to `entry.target`.
    pub(crate) fn link(&mut self, entry: DrivenEntry) {
        match self.driven.iter_mut().find(|e| e.target == entry.target) {
            Some(existing) => *existing = entry,
            None => self.driven.push(entry),
        }
    }

    pub(crate) fn unlink(&mut self, target: ParamId) -> bool {
        let before = self.driven.len();
        self.driven.retain(|e| e.target != target);
        before != self.driven.len()
    }

    /// Weight the driver currently assigns to a target with range `driven`.
    pub fn target_weight(&self, entry: &DrivenEntry, driven: WeightRange) -> f32 {
        let range = self.param.range();
        if self.param.is_animating() {
            animated_driven_weight(&entry.breakpoints, range, driven, self.param.weight())
        } else {
            driven_weight(&entry.breakpoints, range, driven, self.param.weight())
        }
    }
}
