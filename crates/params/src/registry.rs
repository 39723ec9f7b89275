use appearance_common::ParamId;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::driver::{DrivenEntry, DriverParam};
use crate::visual::VisualParam;

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("parameter {0} not found")]
    NotFound(ParamId),
    #[error("parameter {0} already registered")]
    Duplicate(ParamId),
    #[error("parameter name {0:?} already registered")]
    DuplicateName(String),
    #[error("parameter {target} is driven by {driver} and cannot be set directly")]
    DrivenByDriver { target: ParamId, driver: ParamId },
    #[error("parameter {id} has invalid range [{min}, {max}]")]
    InvalidRange { id: ParamId, min: f32, max: f32 },
}

/// Change record produced whenever a stored weight changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamEvent {
    WeightChanged { id: ParamId, old: f32, new: f32 },
}

/// A registered parameter: plain or driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Visual(VisualParam),
    Driver(DriverParam),
}

impl Param {
    pub fn visual(&self) -> &VisualParam {
        match self {
            Param::Visual(p) => p,
            Param::Driver(d) => d.param(),
        }
    }

    fn visual_mut(&mut self) -> &mut VisualParam {
        match self {
            Param::Visual(p) => p,
            Param::Driver(d) => d.param_mut(),
        }
    }

    pub fn id(&self) -> ParamId {
        self.visual().id()
    }

    pub fn weight(&self) -> f32 {
        self.visual().weight()
    }

    pub fn as_driver(&self) -> Option<&DriverParam> {
        match self {
            Param::Driver(d) => Some(d),
            Param::Visual(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No parameter with the target id is registered (yet).
    TargetMissing,
    TargetIsDriver,
    SelfReference,
    UnorderedBreakpoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedLink {
    pub driver: ParamId,
    pub target: ParamId,
    pub reason: SkipReason,
}

/// Outcome of resolving queued driver links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkReport {
    pub linked: usize,
    pub skipped: Vec<SkippedLink>,
}

impl LinkReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Owns every visual and driver parameter of one avatar.
///
/// Driver links are queued when a driver is added and resolved by
/// [`link_drivers`](Self::link_drivers), so parameters may arrive in any order.
/// Links whose target has not been registered stay queued for a later pass.
#[derive(Debug, Default)]
pub struct ParamRegistry {
    params: BTreeMap<ParamId, Param>,
    by_name: BTreeMap<String, ParamId>,
    pending: Vec<(ParamId, DrivenEntry)>,
    events: Vec<ParamEvent>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn add_visual(&mut self, param: VisualParam) -> Result<(), ParamError> {
        self.insert(Param::Visual(param))
    }

    /// Register a driver and queue its links for the next [`link_drivers`](Self::link_drivers).
    pub fn add_driver(
        &mut self,
        param: VisualParam,
        links: impl IntoIterator<Item = DrivenEntry>,
    ) -> Result<(), ParamError> {
        let id = param.id();
        self.insert(Param::Driver(DriverParam::new(param)))?;
        self.pending.extend(links.into_iter().map(|entry| (id, entry)));
        Ok(())
    }

    fn insert(&mut self, param: Param) -> Result<(), ParamError> {
        let id = param.id();
        if self.params.contains_key(&id) {
            return Err(ParamError::Duplicate(id));
        }
        let name = param.visual().name();
        if self.by_name.contains_key(name) {
            return Err(ParamError::DuplicateName(name.to_string()));
        }
        self.by_name.insert(name.to_string(), id);
        self.params.insert(id, param);
        Ok(())
    }

    /// Resolve queued links. Each bad link is skipped and reported; the rest
    /// are linked and their targets immediately take the driver's mapping.
    pub fn link_drivers(&mut self) -> LinkReport {
        let mut report = LinkReport::default();
        let mut still_pending = Vec::new();
        let mut touched = Vec::new();

        for (driver_id, entry) in std::mem::take(&mut self.pending) {
            let reason = if entry.target == driver_id {
                Some(SkipReason::SelfReference)
            } else if !entry.breakpoints.is_ordered() {
                Some(SkipReason::UnorderedBreakpoints)
            } else {
                match self.params.get(&entry.target) {
                    None => Some(SkipReason::TargetMissing),
                    Some(Param::Driver(_)) => Some(SkipReason::TargetIsDriver),
                    Some(Param::Visual(_)) => None,
                }
            };

            if let Some(reason) = reason {
                tracing::warn!(driver = %driver_id, driven = %entry.target, ?reason, "skipping driver link");
                report.skipped.push(SkippedLink {
                    driver: driver_id,
                    target: entry.target,
                    reason,
                });
                if reason == SkipReason::TargetMissing {
                    still_pending.push((driver_id, entry));
                }
                continue;
            }

            if let Some(Param::Driver(driver)) = self.params.get_mut(&driver_id) {
                driver.link(entry);
                report.linked += 1;
                if !touched.contains(&driver_id) {
                    touched.push(driver_id);
                }
            }
        }
        self.pending = still_pending;

        for driver_id in touched {
            self.propagate(driver_id);
        }
        tracing::debug!(linked = report.linked, skipped = report.skipped.len(), "driver links resolved");
        report
    }

    /// Links still waiting for their target to be registered.
    pub fn pending_links(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, id: ParamId) -> Option<&Param> {
        self.params.get(&id)
    }

    pub fn visual(&self, id: ParamId) -> Option<&VisualParam> {
        self.params.get(&id).map(Param::visual)
    }

    pub fn driver(&self, id: ParamId) -> Option<&DriverParam> {
        self.params.get(&id).and_then(Param::as_driver)
    }

    pub fn weight(&self, id: ParamId) -> Option<f32> {
        self.params.get(&id).map(Param::weight)
    }

    pub fn find(&self, name: &str) -> Option<ParamId> {
        self.by_name.get(name).copied()
    }

    /// All parameters in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.values()
    }

    /// The first driver (in id order) linked to `target`.
    pub fn driver_of(&self, target: ParamId) -> Option<ParamId> {
        self.params
            .values()
            .filter_map(Param::as_driver)
            .find(|d| d.drives(target))
            .map(DriverParam::id)
    }

    /// Set a weight from outside. Driven targets are rejected; drivers propagate.
    ///
    /// Returns whether any stored weight changed.
    pub fn set_weight(&mut self, id: ParamId, weight: f32) -> Result<bool, ParamError> {
        if !self.params.contains_key(&id) {
            return Err(ParamError::NotFound(id));
        }
        if let Some(driver) = self.driver_of(id) {
            tracing::warn!(param = %id, %driver, "rejecting direct write to driven parameter");
            return Err(ParamError::DrivenByDriver { target: id, driver });
        }
        let before = self.events.len();
        self.apply(id, weight);
        Ok(self.events.len() != before)
    }

    pub fn reset_to_default(&mut self, id: ParamId) -> Result<bool, ParamError> {
        let default = self
            .visual(id)
            .map(VisualParam::default_weight)
            .ok_or(ParamError::NotFound(id))?;
        self.set_weight(id, default)
    }

    fn apply(&mut self, id: ParamId, weight: f32) {
        let Some(param) = self.params.get_mut(&id) else {
            return;
        };
        let old = param.weight();
        if param.visual_mut().set_weight(weight) {
            self.events.push(ParamEvent::WeightChanged {
                id,
                old,
                new: param.weight(),
            });
        }
        if matches!(param, Param::Driver(_)) {
            self.propagate(id);
        }
    }

    /// Push the driver's current weight through every linked entry.
    fn propagate(&mut self, driver_id: ParamId) {
        let Some(driver) = self.driver(driver_id) else {
            return;
        };
        let updates: Vec<(ParamId, f32)> = driver
            .driven()
            .iter()
            .filter_map(|entry| {
                let range = self.visual(entry.target)?.range();
                Some((entry.target, driver.target_weight(entry, range)))
            })
            .collect();

        for (target, weight) in updates {
            if let Some(param) = self.params.get_mut(&target) {
                let old = param.weight();
                if param.visual_mut().set_weight(weight) {
                    self.events.push(ParamEvent::WeightChanged {
                        id: target,
                        old,
                        new: param.weight(),
                    });
                }
            }
        }
    }

    /// Remove a parameter. Drivers release their targets; targets are unlinked
    /// from every driver. Queued links that mention it are dropped.
    pub fn remove_param(&mut self, id: ParamId) -> Result<Param, ParamError> {
        let param = self.params.remove(&id).ok_or(ParamError::NotFound(id))?;
        self.by_name.retain(|_, v| *v != id);
        self.pending
            .retain(|(driver, entry)| *driver != id && entry.target != id);
        for other in self.params.values_mut() {
            if let Param::Driver(d) = other {
                d.unlink(id);
            }
        }
        if let Param::Driver(d) = &param {
            // Freed targets leave animation mode, so any overshoot is clamped.
            for entry in d.driven() {
                if let Some(target) = self.params.get_mut(&entry.target) {
                    let old = target.weight();
                    let visual = target.visual_mut();
                    visual.set_animating(false);
                    if visual.set_weight(old) {
                        self.events.push(ParamEvent::WeightChanged {
                            id: entry.target,
                            old,
                            new: target.weight(),
                        });
                    }
                }
            }
        }
        tracing::debug!(param = %id, "parameter removed");
        Ok(param)
    }

    /// Begin animating `id` towards `target`. A driver's targets accept unclamped
    /// weights until [`stop_animation`](Self::stop_animation).
    pub fn start_animation(&mut self, id: ParamId, target: f32) -> Result<(), ParamError> {
        if let Some(driver) = self.driver_of(id) {
            return Err(ParamError::DrivenByDriver { target: id, driver });
        }
        let param = self.params.get_mut(&id).ok_or(ParamError::NotFound(id))?;
        param.visual_mut().start_animation(target);
        let targets: Vec<ParamId> = param
            .as_driver()
            .map(|d| d.driven().iter().map(|e| e.target).collect())
            .unwrap_or_default();
        for target in targets {
            if let Some(p) = self.params.get_mut(&target) {
                p.visual_mut().set_animating(true);
            }
        }
        Ok(())
    }

    fn animation_roots(&self) -> Vec<ParamId> {
        self.params
            .values()
            .filter(|p| p.visual().is_animating())
            .map(Param::id)
            .filter(|id| self.driver_of(*id).is_none())
            .collect()
    }

    /// Move every animating parameter `delta` (0..=1) of the way to its target.
    pub fn animate(&mut self, delta: f32) {
        for id in self.animation_roots() {
            let Some(weight) = self.visual(id).map(|p| p.interpolated(delta)) else {
                continue;
            };
            self.apply(id, weight);
        }
    }

    /// End all animation. Roots settle on their clamped targets and drivers
    /// re-apply the static mapping to their targets.
    pub fn stop_animation(&mut self) {
        let roots = self.animation_roots();
        let mut settle = Vec::with_capacity(roots.len());
        for id in &roots {
            if let Some(p) = self.params.get_mut(id) {
                settle.push((*id, p.visual_mut().stop_animation()));
            }
        }
        for param in self.params.values_mut() {
            param.visual_mut().set_animating(false);
        }
        for (id, weight) in settle {
            self.apply(id, weight);
        }
    }

    /// Whether any parameter is mid-animation.
    pub fn is_animating(&self) -> bool {
        self.params.values().any(|p| p.visual().is_animating())
    }

    /// Distortion sources of `id`: itself for a shape param, its targets for a driver.
    fn distortion_sources(&self, id: ParamId) -> Option<Vec<&VisualParam>> {
        match self.params.get(&id)? {
            Param::Visual(p) => Some(vec![p]),
            Param::Driver(d) => Some(
                d.driven()
                    .iter()
                    .filter_map(|e| self.visual(e.target))
                    .collect(),
            ),
        }
    }

    pub fn total_distortion(&self, id: ParamId) -> Option<f32> {
        let sources = self.distortion_sources(id)?;
        Some(
            sources
                .iter()
                .filter_map(|p| p.distortion())
                .map(|d| d.total())
                .sum(),
        )
    }

    pub fn average_distortion(&self, id: ParamId) -> Option<Vec3> {
        let sources = self.distortion_sources(id)?;
        if sources.is_empty() {
            return Some(Vec3::ZERO);
        }
        let sum: Vec3 = sources
            .iter()
            .filter_map(|p| p.distortion())
            .map(|d| d.average())
            .sum();
        Some(sum / sources.len() as f32)
    }

    pub fn max_distortion(&self, id: ParamId) -> Option<f32> {
        let sources = self.distortion_sources(id)?;
        Some(
            sources
                .iter()
                .filter_map(|p| p.distortion())
                .map(|d| d.max())
                .fold(0.0, f32::max),
        )
    }

    /// Per-vertex deltas of every source, in link order.
    pub fn distortion_vertices(&self, id: ParamId) -> Option<Vec<Vec3>> {
        let sources = self.distortion_sources(id)?;
        Some(
            sources
                .iter()
                .filter_map(|p| p.distortion())
                .flat_map(|d| d.deltas.iter().copied())
                .collect(),
        )
    }

    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ParamEvent> {
        std::mem::take(&mut self.events)
    }
}
