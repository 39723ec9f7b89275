use appearance_assets::{AppearanceDefs, DefsError};
use appearance_common::{AssetId, BakeRegion, LocalTextureSlot, ParamId, TextureQuality, UploadId};
use appearance_params::{LinkReport, ParamError, ParamEvent, ParamRegistry};
use appearance_skeleton::{Skeleton, SkeletonError};
use appearance_texture::{
    AssetUploader, BufferState, CompletionResult, ComposeContext, Composite, GlobalColor,
    ImageCache, LayerSetDef, LocalTexture, PixelDigest, Raster, TextureError, TextureLayerSet,
    UploadDecision, UploadQueue,
};
use glam::Vec4;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{AppearanceConfig, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum AppearanceError {
    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Defs(#[from] DefsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no layer set for region {0}")]
    UnknownRegion(BakeRegion),
    #[error("layer set for region {0} already exists")]
    DuplicateRegion(BakeRegion),
}

/// Record of every observable change, drained by the owner.
#[derive(Debug, Clone, PartialEq)]
pub enum AppearanceEvent {
    ParamChanged { id: ParamId, old: f32, new: f32 },
    LayerSetInvalidated { region: BakeRegion },
    Composited {
        region: BakeRegion,
        quality: TextureQuality,
        digest: PixelDigest,
    },
    UploadIssued { region: BakeRegion, id: UploadId },
    UploadStored {
        region: BakeRegion,
        id: UploadId,
        asset: AssetId,
    },
    UploadFailed {
        region: BakeRegion,
        id: UploadId,
        reason: String,
    },
    /// A completion for a cancelled, superseded, or removed upload.
    UploadStale { id: UploadId },
    LayerSetRemoved { region: BakeRegion },
}

/// Work done by one [`AvatarAppearance::pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub completions: usize,
    pub stale: usize,
    pub composited: usize,
    pub uploads_issued: usize,
    pub marked_clean: usize,
}

impl PumpStats {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// One avatar's appearance state: skeleton, parameters, colors, local textures,
/// static images, and the layer sets that bake them.
///
/// Single-threaded and frame-pumped. Mutations mark dependent layer sets dirty;
/// [`pump`](Self::pump) recomposites and uploads within the configured budgets.
#[derive(Debug)]
pub struct AvatarAppearance {
    config: AppearanceConfig,
    skeleton: Skeleton,
    params: ParamRegistry,
    globals: BTreeMap<String, GlobalColor>,
    local_textures: BTreeMap<LocalTextureSlot, LocalTexture>,
    images: ImageCache,
    layer_sets: BTreeMap<BakeRegion, TextureLayerSet>,
    uploads: UploadQueue,
    events: Vec<AppearanceEvent>,
}

impl AvatarAppearance {
    /// An avatar with no joints, params, or layer sets.
    pub fn new(config: AppearanceConfig) -> Result<Self, AppearanceError> {
        config.validate()?;
        let images = ImageCache::new(config.image_root.clone());
        Ok(Self {
            config,
            skeleton: Skeleton::new(),
            params: ParamRegistry::new(),
            globals: BTreeMap::new(),
            local_textures: BTreeMap::new(),
            images,
            layer_sets: BTreeMap::new(),
            uploads: UploadQueue::new(),
            events: Vec::new(),
        })
    }

    /// Build every part from definitions. Bad driver links are reported, not fatal.
    pub fn from_defs(
        defs: &AppearanceDefs,
        config: AppearanceConfig,
    ) -> Result<(Self, LinkReport), AppearanceError> {
        defs.validate()?;
        let mut avatar = Self::new(config)?;
        avatar.skeleton = defs.skeleton.build()?;
        let (params, report) = ParamRegistry::from_defs(&defs.params)?;
        avatar.params = params;
        avatar.params.drain_events();
        for color in &defs.global_colors {
            avatar.globals.insert(color.name.clone(), color.clone());
        }
        for set in &defs.layer_sets {
            avatar.add_layer_set(set.clone())?;
        }
        tracing::info!(
            joints = avatar.skeleton.len(),
            params = avatar.params.len(),
            layer_sets = avatar.layer_sets.len(),
            skipped_links = report.skipped.len(),
            "avatar appearance built"
        );
        Ok((avatar, report))
    }

    pub fn config(&self) -> &AppearanceConfig {
        &self.config
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// Joint writes from the animation collaborator go through here.
    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn params(&self) -> &ParamRegistry {
        &self.params
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    /// Register or replace a static image; sets that read it recomposite.
    pub fn insert_static_image(&mut self, name: impl Into<String>, raster: Raster) {
        let name = name.into();
        self.images.insert(name.clone(), raster);
        let regions: Vec<BakeRegion> = self
            .layer_sets
            .values()
            .filter(|set| set.def().static_images().contains(name.as_str()))
            .map(TextureLayerSet::region)
            .collect();
        tracing::debug!(image = %name, dependents = regions.len(), "static image set");
        for region in regions {
            self.invalidate(region);
        }
    }

    /// Current value of a named global color.
    pub fn global_color(&self, name: &str) -> Option<Vec4> {
        self.globals.get(name).map(|g| g.evaluate(&self.params))
    }

    pub fn layer_set(&self, region: BakeRegion) -> Option<&TextureLayerSet> {
        self.layer_sets.get(&region)
    }

    /// Layer sets in region order.
    pub fn layer_sets(&self) -> impl Iterator<Item = &TextureLayerSet> {
        self.layer_sets.values()
    }

    pub fn composite(&self, region: BakeRegion) -> Option<&Composite> {
        self.layer_sets.get(&region)?.buffer().composite()
    }

    pub fn local_texture(&self, slot: &LocalTextureSlot) -> Option<&LocalTexture> {
        self.local_textures.get(slot)
    }

    /// Add a layer set and preload its static images. It composes on the next pump.
    pub fn add_layer_set(&mut self, def: LayerSetDef) -> Result<(), AppearanceError> {
        let region = def.region;
        if self.layer_sets.contains_key(&region) {
            return Err(AppearanceError::DuplicateRegion(region));
        }
        let failures = self.images.preload(def.static_images());
        if !failures.is_empty() {
            tracing::warn!(%region, missing = failures.len(), "layer set has unavailable static images");
        }
        self.layer_sets
            .insert(region, TextureLayerSet::new(def, self.config.bake_size));
        tracing::debug!(%region, "layer set added");
        Ok(())
    }

    /// Remove a layer set. Its outstanding upload, if any, becomes stale.
    pub fn remove_layer_set(&mut self, region: BakeRegion) -> Result<TextureLayerSet, AppearanceError> {
        let set = self
            .layer_sets
            .remove(&region)
            .ok_or(AppearanceError::UnknownRegion(region))?;
        if let Some(id) = set.buffer().in_flight() {
            tracing::debug!(%region, upload = %id, "removed layer set had an upload in flight");
        }
        self.events.push(AppearanceEvent::LayerSetRemoved { region });
        Ok(set)
    }

    pub fn set_param_weight(&mut self, id: ParamId, weight: f32) -> Result<bool, AppearanceError> {
        let changed = self.params.set_weight(id, weight)?;
        self.route_param_events();
        Ok(changed)
    }

    pub fn reset_param(&mut self, id: ParamId) -> Result<bool, AppearanceError> {
        let changed = self.params.reset_to_default(id)?;
        self.route_param_events();
        Ok(changed)
    }

    pub fn start_param_animation(&mut self, id: ParamId, target: f32) -> Result<(), AppearanceError> {
        self.params.start_animation(id, target)?;
        Ok(())
    }

    /// Advance every animating parameter `delta` (0..=1) towards its target.
    pub fn animate_params(&mut self, delta: f32) {
        self.params.animate(delta);
        self.route_param_events();
    }

    pub fn stop_param_animation(&mut self) {
        self.params.stop_animation();
        self.route_param_events();
    }

    /// Turn drained param events into appearance events and invalidate every
    /// layer set that reads a changed param, directly or through a global color.
    fn route_param_events(&mut self) {
        let mut changed = BTreeSet::new();
        for event in self.params.drain_events() {
            let ParamEvent::WeightChanged { id, old, new } = event;
            changed.insert(id);
            self.events.push(AppearanceEvent::ParamChanged { id, old, new });
        }
        if changed.is_empty() {
            return;
        }
        let regions: Vec<BakeRegion> = self
            .layer_sets
            .values()
            .filter(|set| changed.iter().any(|id| set.depends_on_param(*id, &self.globals)))
            .map(TextureLayerSet::region)
            .collect();
        for region in regions {
            self.invalidate(region);
        }
    }

    /// Supply or replace a wearable's local texture; dependent sets recomposite.
    pub fn set_local_texture(&mut self, slot: LocalTextureSlot, texture: LocalTexture) {
        tracing::debug!(%slot, quality = ?texture.quality, "local texture set");
        self.local_textures.insert(slot.clone(), texture);
        self.invalidate_slot(&slot);
    }

    pub fn remove_local_texture(&mut self, slot: &LocalTextureSlot) -> Option<LocalTexture> {
        let removed = self.local_textures.remove(slot);
        if removed.is_some() {
            self.invalidate_slot(slot);
        }
        removed
    }

    fn invalidate_slot(&mut self, slot: &LocalTextureSlot) {
        let regions: Vec<BakeRegion> = self
            .layer_sets
            .values()
            .filter(|set| set.depends_on_slot(slot))
            .map(TextureLayerSet::region)
            .collect();
        for region in regions {
            self.invalidate(region);
        }
    }

    pub fn set_layer_set_visible(&mut self, region: BakeRegion, visible: bool) -> Result<bool, AppearanceError> {
        let set = self
            .layer_sets
            .get_mut(&region)
            .ok_or(AppearanceError::UnknownRegion(region))?;
        let changed = set.set_visible(visible);
        if changed {
            self.events.push(AppearanceEvent::LayerSetInvalidated { region });
        }
        Ok(changed)
    }

    /// Mark a set dirty for a reason outside parameters and textures (e.g. a
    /// morph change reported by the mesh collaborator).
    pub fn invalidate_layer_set(&mut self, region: BakeRegion) -> Result<(), AppearanceError> {
        if !self.layer_sets.contains_key(&region) {
            return Err(AppearanceError::UnknownRegion(region));
        }
        self.invalidate(region);
        Ok(())
    }

    fn invalidate(&mut self, region: BakeRegion) {
        if let Some(set) = self.layer_sets.get_mut(&region) {
            set.buffer_mut().mark_dirty();
            tracing::debug!(%region, "layer set invalidated");
            self.events.push(AppearanceEvent::LayerSetInvalidated { region });
        }
    }

    /// Cancel any outstanding upload (its completion becomes stale), forget the
    /// upload history, and re-queue the set.
    pub fn force_rebake(&mut self, region: BakeRegion) -> Result<(), AppearanceError> {
        let set = self
            .layer_sets
            .get_mut(&region)
            .ok_or(AppearanceError::UnknownRegion(region))?;
        if let Some(stale) = set.buffer_mut().force_rebake() {
            tracing::debug!(%region, upload = %stale, "outstanding upload superseded by rebake");
        }
        self.events.push(AppearanceEvent::LayerSetInvalidated { region });
        Ok(())
    }

    /// Release a failed upload's hold. Returns whether the set was held.
    pub fn retry(&mut self, region: BakeRegion) -> Result<bool, AppearanceError> {
        let set = self
            .layer_sets
            .get_mut(&region)
            .ok_or(AppearanceError::UnknownRegion(region))?;
        Ok(set.buffer_mut().retry())
    }

    /// Whether every layer set is clean.
    pub fn is_settled(&self) -> bool {
        self.layer_sets
            .values()
            .all(|s| s.buffer().state() == BufferState::Clean)
    }

    /// One frame of bake work: apply upload completions, recomposite dirty sets
    /// within `compose_budget`, then issue uploads within `upload_budget`.
    pub fn pump(&mut self, uploader: &mut dyn AssetUploader) -> PumpStats {
        let _span = tracing::info_span!("appearance_pump").entered();
        let mut stats = PumpStats::default();

        for done in self.uploads.drain() {
            stats.completions += 1;
            let result = match self.layer_sets.get_mut(&done.region) {
                Some(set) => set.buffer_mut().complete(done.id, done.outcome),
                None => CompletionResult::Stale,
            };
            match result {
                CompletionResult::Stale => {
                    stats.stale += 1;
                    tracing::warn!(upload = %done.id, region = %done.region, "stale upload completion dropped");
                    self.events.push(AppearanceEvent::UploadStale { id: done.id });
                }
                CompletionResult::Stored(asset) => {
                    tracing::debug!(upload = %done.id, region = %done.region, ?asset, "bake stored");
                    self.events.push(AppearanceEvent::UploadStored {
                        region: done.region,
                        id: done.id,
                        asset,
                    });
                }
                CompletionResult::Failed(reason) => {
                    tracing::warn!(upload = %done.id, region = %done.region, %reason, "bake upload failed");
                    self.events.push(AppearanceEvent::UploadFailed {
                        region: done.region,
                        id: done.id,
                        reason,
                    });
                }
            }
        }

        let ctx = ComposeContext {
            params: &self.params,
            globals: &self.globals,
            local_textures: &self.local_textures,
            images: &self.images,
        };
        for set in self.layer_sets.values_mut() {
            if stats.composited >= self.config.compose_budget {
                break;
            }
            if !set.buffer().needs_compose() {
                continue;
            }
            let region = set.region();
            let composite = set.compose(&ctx);
            self.events.push(AppearanceEvent::Composited {
                region,
                quality: composite.quality,
                digest: composite.digest,
            });
            stats.composited += 1;
        }

        for set in self.layer_sets.values_mut() {
            if set.buffer().state() != BufferState::Composited {
                continue;
            }
            match set.buffer().upload_decision(self.config.upload_preview) {
                UploadDecision::Unchanged => {
                    set.buffer_mut().mark_clean();
                    stats.marked_clean += 1;
                }
                UploadDecision::WaitForFinal | UploadDecision::InFlight => {}
                UploadDecision::Ready => {
                    if stats.uploads_issued >= self.config.upload_budget
                        || !set.buffer().can_begin_upload()
                    {
                        continue;
                    }
                    let id = self.uploads.next_id();
                    let Some(request) = set.begin_upload(id) else {
                        continue;
                    };
                    let region = request.region;
                    tracing::debug!(%region, upload = %id, quality = ?request.quality, "bake upload issued");
                    uploader.request_upload(request, self.uploads.completer(id, region));
                    self.events.push(AppearanceEvent::UploadIssued { region, id });
                    stats.uploads_issued += 1;
                }
            }
        }

        tracing::trace!(?stats, "appearance pump");
        stats
    }

    /// Pump until a pump does no work or `max_rounds` is reached. Returns the
    /// number of pumps run.
    pub fn pump_until_idle(&mut self, uploader: &mut dyn AssetUploader, max_rounds: usize) -> usize {
        for round in 1..=max_rounds {
            if self.pump(uploader).is_idle() {
                return round;
            }
        }
        max_rounds
    }

    pub fn events(&self) -> &[AppearanceEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<AppearanceEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appearance_assets::{
        ARM_THICKNESS, CHEST_WIDTH, LOWER_PANTS, MUSCULAR, SHIRT_LENGTH, SKIN_TONE, UPPER_SHIRT,
    };
    use appearance_texture::{LayerBlend, LayerSource, LoopbackUploader, Rgba8, TextureLayer};

    fn config() -> AppearanceConfig {
        AppearanceConfig {
            bake_size: 8,
            compose_budget: 8,
            upload_budget: 8,
            ..AppearanceConfig::default()
        }
    }

    fn sample() -> AvatarAppearance {
        let (avatar, report) = AvatarAppearance::from_defs(&AppearanceDefs::sample(), config()).unwrap();
        assert!(report.is_clean());
        avatar
    }

    fn clothed() -> AvatarAppearance {
        let mut avatar = sample();
        for slot in [UPPER_SHIRT, LOWER_PANTS] {
            avatar.set_local_texture(
                LocalTextureSlot::new(slot),
                LocalTexture::new(Raster::filled(4, 4, Rgba8::new(40, 40, 160, 255)), TextureQuality::Final),
            );
        }
        avatar
    }

    fn uploads_for(uploader: &LoopbackUploader, region: BakeRegion) -> usize {
        uploader.requests().iter().filter(|(_, r)| *r == region).count()
    }

    #[test]
    fn clothed_avatar_bakes_and_settles() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::new();
        avatar.pump_until_idle(&mut uploader, 10);
        assert!(avatar.is_settled());
        assert_eq!(uploader.requests().len(), 5);
        for set in avatar.layer_sets() {
            assert!(set.buffer().last_uploaded().is_some());
        }
    }

    #[test]
    fn preview_sets_wait_for_final_textures() {
        let mut avatar = sample();
        let mut uploader = LoopbackUploader::new();
        avatar.pump_until_idle(&mut uploader, 10);
        let upper = avatar.layer_set(BakeRegion::UpperBody).unwrap();
        assert_eq!(upper.buffer().state(), BufferState::Composited);
        assert_eq!(avatar.composite(BakeRegion::UpperBody).unwrap().quality, TextureQuality::Preview);
        assert_eq!(uploads_for(&uploader, BakeRegion::UpperBody), 0);
        assert_eq!(uploads_for(&uploader, BakeRegion::Head), 1);

        avatar.set_local_texture(
            LocalTextureSlot::new(UPPER_SHIRT),
            LocalTexture::new(Raster::filled(2, 2, Rgba8::WHITE), TextureQuality::Final),
        );
        avatar.pump_until_idle(&mut uploader, 10);
        assert_eq!(uploads_for(&uploader, BakeRegion::UpperBody), 1);
        assert_eq!(
            avatar.layer_set(BakeRegion::UpperBody).unwrap().buffer().state(),
            BufferState::Clean
        );
    }

    #[test]
    fn preview_uploads_when_enabled() {
        let config = AppearanceConfig {
            upload_preview: true,
            ..config()
        };
        let (mut avatar, _) = AvatarAppearance::from_defs(&AppearanceDefs::sample(), config).unwrap();
        let mut uploader = LoopbackUploader::new();
        avatar.pump_until_idle(&mut uploader, 10);
        assert!(avatar.is_settled());
        assert_eq!(uploads_for(&uploader, BakeRegion::UpperBody), 1);
    }

    #[test]
    fn changes_during_upload_coalesce_into_one_follow_up() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::deferred();
        avatar.pump(&mut uploader);
        assert_eq!(uploads_for(&uploader, BakeRegion::Head), 1);

        avatar.set_param_weight(SKIN_TONE, 0.1).unwrap();
        avatar.pump(&mut uploader);
        avatar.set_param_weight(SKIN_TONE, 0.9).unwrap();
        avatar.pump(&mut uploader);
        assert_eq!(uploads_for(&uploader, BakeRegion::Head), 1);
        assert!(avatar.layer_set(BakeRegion::Head).unwrap().buffer().in_flight().is_some());

        uploader.release_all();
        avatar.pump(&mut uploader);
        assert_eq!(uploads_for(&uploader, BakeRegion::Head), 2);

        uploader.release_all();
        avatar.pump_until_idle(&mut uploader, 10);
        assert_eq!(uploads_for(&uploader, BakeRegion::Head), 2);
        assert!(avatar.is_settled());
    }

    #[test]
    fn param_changes_route_to_dependent_sets_only() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::new();
        avatar.pump_until_idle(&mut uploader, 10);
        avatar.drain_events();

        avatar.set_param_weight(SHIRT_LENGTH, 0.2).unwrap();
        let invalidated: Vec<BakeRegion> = avatar
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                AppearanceEvent::LayerSetInvalidated { region } => Some(region),
                _ => None,
            })
            .collect();
        assert_eq!(invalidated, vec![BakeRegion::UpperBody]);

        // Skin tone reaches three regions through the global skin color.
        avatar.set_param_weight(SKIN_TONE, 0.0).unwrap();
        let count = avatar
            .drain_events()
            .iter()
            .filter(|e| matches!(e, AppearanceEvent::LayerSetInvalidated { .. }))
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn driver_moves_targets_and_rejects_direct_writes() {
        let mut avatar = sample();
        avatar.set_param_weight(MUSCULAR, 0.5).unwrap();
        assert_eq!(avatar.params().weight(ARM_THICKNESS), Some(1.0));
        assert_eq!(avatar.params().weight(CHEST_WIDTH), Some(1.0));
        let err = avatar.set_param_weight(CHEST_WIDTH, 0.0).unwrap_err();
        assert!(matches!(
            err,
            AppearanceError::Param(ParamError::DrivenByDriver { .. })
        ));
        assert_eq!(avatar.params().weight(CHEST_WIDTH), Some(1.0));
    }

    #[test]
    fn failed_upload_holds_until_retry() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::new();
        uploader.fail_next(5);
        avatar.pump(&mut uploader);
        avatar.pump(&mut uploader);
        let head = avatar.layer_set(BakeRegion::Head).unwrap().buffer();
        assert_eq!(head.state(), BufferState::NeedsUpdate);
        assert!(head.is_held());

        assert!(avatar.pump(&mut uploader).is_idle());
        assert!(avatar.retry(BakeRegion::Head).unwrap());
        avatar.pump_until_idle(&mut uploader, 10);
        assert_eq!(
            avatar.layer_set(BakeRegion::Head).unwrap().buffer().state(),
            BufferState::Clean
        );
        assert_eq!(uploads_for(&uploader, BakeRegion::Head), 2);
    }

    #[test]
    fn rebake_and_removal_make_completions_stale() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::deferred();
        avatar.pump(&mut uploader);
        avatar.force_rebake(BakeRegion::Head).unwrap();
        avatar.remove_layer_set(BakeRegion::Eyes).unwrap();
        uploader.release_all();
        let stats = avatar.pump(&mut uploader);
        assert_eq!(stats.stale, 2);
        assert_eq!(stats.completions, 5);
        assert!(avatar.layer_set(BakeRegion::Eyes).is_none());
        // The rebaked head recomposited and uploads again.
        assert_eq!(uploads_for(&uploader, BakeRegion::Head), 2);
    }

    #[test]
    fn compose_budget_limits_work_per_pump() {
        let config = AppearanceConfig {
            compose_budget: 1,
            upload_budget: 1,
            ..config()
        };
        let (mut avatar, _) = AvatarAppearance::from_defs(&AppearanceDefs::sample(), config).unwrap();
        let mut uploader = LoopbackUploader::new();
        let stats = avatar.pump(&mut uploader);
        assert_eq!(stats.composited, 1);
        assert_eq!(stats.uploads_issued, 1);
    }

    #[test]
    fn unchanged_recomposite_goes_clean_without_upload() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::new();
        avatar.pump_until_idle(&mut uploader, 10);
        avatar.invalidate_layer_set(BakeRegion::Eyes).unwrap();
        let stats = avatar.pump(&mut uploader);
        assert_eq!(stats.composited, 1);
        assert_eq!(stats.marked_clean, 1);
        assert_eq!(stats.uploads_issued, 0);
        assert!(avatar.is_settled());
    }

    #[test]
    fn hidden_set_bakes_transparent() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::new();
        assert!(avatar.set_layer_set_visible(BakeRegion::Hair, false).unwrap());
        avatar.pump_until_idle(&mut uploader, 10);
        let hair = avatar.composite(BakeRegion::Hair).unwrap();
        assert!(hair.image.pixels().iter().all(|p| *p == Rgba8::TRANSPARENT));
    }

    #[test]
    fn animation_routes_each_step() {
        let mut avatar = clothed();
        avatar.start_param_animation(SKIN_TONE, 1.0).unwrap();
        avatar.animate_params(0.5);
        assert_eq!(avatar.params().weight(SKIN_TONE), Some(0.75));
        avatar.stop_param_animation();
        assert_eq!(avatar.params().weight(SKIN_TONE), Some(1.0));
        assert!(avatar
            .events()
            .iter()
            .any(|e| matches!(e, AppearanceEvent::ParamChanged { id, .. } if *id == SKIN_TONE)));
    }

    #[test]
    fn joint_writes_reach_world_positions() {
        let mut avatar = sample();
        let pelvis = avatar.skeleton().find("mPelvis").unwrap();
        let head = avatar.skeleton().find("mHead").unwrap();
        let before = avatar.skeleton_mut().world_position(head).unwrap();
        avatar
            .skeleton_mut()
            .set_position(pelvis, glam::Vec3::new(0.0, 0.0, 2.0))
            .unwrap();
        let after = avatar.skeleton_mut().world_position(head).unwrap();
        assert!((after.z - before.z - (2.0 - 1.067)).abs() < 1e-5);
    }

    #[test]
    fn replacing_static_image_rebakes_its_readers() {
        let mut avatar = clothed();
        avatar
            .add_layer_set(LayerSetDef::new(BakeRegion::Skirt).with_layer(TextureLayer::new(
                "pattern",
                LayerSource::StaticImage("skirt_pattern".into()),
                LayerBlend::DirectWrite,
            )))
            .unwrap();
        avatar.insert_static_image("skirt_pattern", Raster::filled(2, 2, Rgba8::WHITE));
        let mut uploader = LoopbackUploader::new();
        avatar.pump_until_idle(&mut uploader, 10);
        assert!(avatar.is_settled());
        avatar.drain_events();

        avatar.insert_static_image("skirt_pattern", Raster::filled(2, 2, Rgba8::new(90, 30, 30, 255)));
        assert_eq!(
            avatar.drain_events(),
            vec![AppearanceEvent::LayerSetInvalidated { region: BakeRegion::Skirt }]
        );
        avatar.pump_until_idle(&mut uploader, 10);
        assert_eq!(uploads_for(&uploader, BakeRegion::Skirt), 2);

        avatar.insert_static_image("unused", Raster::filled(1, 1, Rgba8::WHITE));
        assert!(avatar.drain_events().is_empty());
        assert!(avatar.is_settled());
    }

    #[test]
    fn upload_ids_are_allocated_without_gaps() {
        let mut avatar = clothed();
        let mut uploader = LoopbackUploader::deferred();
        avatar.pump(&mut uploader);
        avatar.set_param_weight(SKIN_TONE, 0.2).unwrap();
        avatar.pump(&mut uploader);
        uploader.release_all();
        avatar.pump(&mut uploader);
        let ids: Vec<u64> = uploader.requests().iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, (1..=ids.len() as u64).collect::<Vec<_>>());
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn duplicate_and_unknown_regions() {
        let mut avatar = sample();
        let err = avatar
            .add_layer_set(LayerSetDef::new(BakeRegion::Head))
            .unwrap_err();
        assert!(matches!(err, AppearanceError::DuplicateRegion(BakeRegion::Head)));
        assert!(matches!(
            avatar.retry(BakeRegion::Skirt),
            Err(AppearanceError::UnknownRegion(BakeRegion::Skirt))
        ));
    }
}
