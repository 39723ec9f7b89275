use appearance_avatar::AvatarAppearance;
use appearance_common::{AssetId, BakeRegion, ParamId, TextureQuality, UploadId};
use appearance_skeleton::JointId;
use appearance_texture::BufferState;

/// Appearance inspector for developer tooling.
///
/// Read-only queries against an avatar's appearance state for debugging and
/// the CLI.
pub struct AppearanceInspector;

impl AppearanceInspector {
    /// Produce a summary of the appearance state.
    pub fn summary(avatar: &AvatarAppearance) -> AppearanceSummary {
        let sets: Vec<LayerSetInfo> = Self::layer_sets(avatar);
        AppearanceSummary {
            joint_count: avatar.skeleton().len(),
            param_count: avatar.params().len(),
            layer_set_count: sets.len(),
            uploads_in_flight: sets.iter().filter(|s| s.in_flight.is_some()).count(),
            settled: avatar.is_settled(),
            pending_events: avatar.events().len(),
        }
    }

    /// Joint transform as of the last world-matrix update.
    pub fn inspect_joint(avatar: &AvatarAppearance, name: &str) -> Option<JointInfo> {
        let skeleton = avatar.skeleton();
        let id = skeleton.find(name)?;
        let joint = skeleton.joint(id)?;
        let p = joint.position();
        let world = skeleton.last_world_position(id)?;
        Some(JointInfo {
            id,
            name: joint.name().to_string(),
            parent: joint.parent().and_then(|pid| skeleton.joint(pid)).map(|j| j.name().to_string()),
            local_position: [p.x, p.y, p.z],
            world_position: [world.x, world.y, world.z],
        })
    }

    pub fn inspect_param(avatar: &AvatarAppearance, id: ParamId) -> Option<ParamInfo> {
        let params = avatar.params();
        let visual = params.visual(id)?;
        Some(ParamInfo {
            id,
            name: visual.name().to_string(),
            weight: visual.weight(),
            range: [visual.min(), visual.max()],
            driven_by: params.driver_of(id),
            drives: params.driver(id).map_or(0, |d| d.driven().len()),
        })
    }

    /// Every layer set's buffer state, in region order.
    pub fn layer_sets(avatar: &AvatarAppearance) -> Vec<LayerSetInfo> {
        avatar
            .layer_sets()
            .map(|set| {
                let buffer = set.buffer();
                LayerSetInfo {
                    region: set.region(),
                    layers: set.layers().len(),
                    visible: set.is_visible(),
                    state: buffer.state(),
                    quality: buffer.composite().map(|c| c.quality),
                    in_flight: buffer.in_flight(),
                    held: buffer.is_held(),
                    asset: buffer.last_uploaded().map(|r| r.asset),
                }
            })
            .collect()
    }
}

/// Summary of appearance state for the inspector.
#[derive(Debug, Clone)]
pub struct AppearanceSummary {
    pub joint_count: usize,
    pub param_count: usize,
    pub layer_set_count: usize,
    pub uploads_in_flight: usize,
    pub settled: bool,
    pub pending_events: usize,
}

impl std::fmt::Display for AppearanceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Appearance: joints={} params={} layer_sets={} in_flight={} settled={} pending_events={}",
            self.joint_count,
            self.param_count,
            self.layer_set_count,
            self.uploads_in_flight,
            self.settled,
            self.pending_events
        )
    }
}

#[derive(Debug, Clone)]
pub struct JointInfo {
    pub id: JointId,
    pub name: String,
    pub parent: Option<String>,
    pub local_position: [f32; 3],
    pub world_position: [f32; 3],
}

impl std::fmt::Display for JointInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:<14} parent={:<14} world=({:.3}, {:.3}, {:.3})",
            self.id,
            self.name,
            self.parent.as_deref().unwrap_or("-"),
            self.world_position[0],
            self.world_position[1],
            self.world_position[2],
        )
    }
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub id: ParamId,
    pub name: String,
    pub weight: f32,
    pub range: [f32; 2],
    pub driven_by: Option<ParamId>,
    pub drives: usize,
}

impl std::fmt::Display for ParamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:<14} weight={:.3} range=[{:.2}, {:.2}]",
            self.id, self.name, self.weight, self.range[0], self.range[1]
        )?;
        if let Some(driver) = self.driven_by {
            write!(f, " driven_by={driver}")?;
        }
        if self.drives > 0 {
            write!(f, " drives={}", self.drives)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LayerSetInfo {
    pub region: BakeRegion,
    pub layers: usize,
    pub visible: bool,
    pub state: BufferState,
    pub quality: Option<TextureQuality>,
    pub in_flight: Option<UploadId>,
    pub held: bool,
    pub asset: Option<AssetId>,
}

impl std::fmt::Display for LayerSetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<10} layers={} state={:?}",
            self.region.to_string(),
            self.layers,
            self.state
        )?;
        if let Some(quality) = self.quality {
            write!(f, " quality={quality:?}")?;
        }
        if let Some(id) = self.in_flight {
            write!(f, " in_flight={id}")?;
        }
        if self.held {
            write!(f, " held")?;
        }
        if !self.visible {
            write!(f, " hidden")?;
        }
        if let Some(asset) = self.asset {
            write!(f, " asset={:.8}", asset.0.to_string())?;
        }
        Ok(())
    }
}
