use appearance_common::{BakeRegion, LocalTextureSlot, ParamId, UploadId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::buffer::LayerSetBuffer;
use crate::color::GlobalColor;
use crate::compose::{ComposeContext, Composite, compose};
use crate::layer::TextureLayer;
use crate::upload::UploadRequest;

/// Serializable definition of one body region's layer stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSetDef {
    pub region: BakeRegion,
    /// Rendered first to last.
    pub layers: Vec<TextureLayer>,
    /// Force opaque alpha after all layers render.
    #[serde(default)]
    pub clear_alpha: bool,
    /// Image whose alpha replaces the final alpha. Takes precedence over `clear_alpha`.
    #[serde(default)]
    pub static_alpha: Option<String>,
}

impl LayerSetDef {
    pub fn new(region: BakeRegion) -> Self {
        Self {
            region,
            layers: Vec::new(),
            clear_alpha: false,
            static_alpha: None,
        }
    }

    pub fn with_layer(mut self, layer: TextureLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn params(&self) -> BTreeSet<ParamId> {
        self.layers.iter().flat_map(TextureLayer::params).collect()
    }

    pub fn global_colors(&self) -> BTreeSet<&str> {
        self.layers
            .iter()
            .filter_map(TextureLayer::global_color)
            .collect()
    }

    pub fn local_slots(&self) -> BTreeSet<&LocalTextureSlot> {
        self.layers.iter().flat_map(TextureLayer::local_slots).collect()
    }

    pub fn static_images(&self) -> BTreeSet<&str> {
        self.layers
            .iter()
            .flat_map(TextureLayer::static_images)
            .chain(self.static_alpha.as_deref())
            .collect()
    }
}

/// A layer stack and the buffer it bakes into.
#[derive(Debug, Clone)]
pub struct TextureLayerSet {
    def: LayerSetDef,
    visible: bool,
    buffer: LayerSetBuffer,
}

impl TextureLayerSet {
    pub fn new(def: LayerSetDef, size: u32) -> Self {
        Self {
            def,
            visible: true,
            buffer: LayerSetBuffer::new(size, size),
        }
    }

    pub fn region(&self) -> BakeRegion {
        self.def.region
    }

    pub fn def(&self) -> &LayerSetDef {
        &self.def
    }

    pub fn layers(&self) -> &[TextureLayer] {
        &self.def.layers
    }

    pub fn buffer(&self) -> &LayerSetBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut LayerSetBuffer {
        &mut self.buffer
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Returns whether visibility changed; a change invalidates the buffer.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        if self.visible == visible {
            return false;
        }
        self.visible = visible;
        self.buffer.mark_dirty();
        true
    }

    /// Whether a change to `id` affects this set, directly or via a global color.
    pub fn depends_on_param(&self, id: ParamId, globals: &BTreeMap<String, GlobalColor>) -> bool {
        self.def.layers.iter().any(|layer| {
            layer.params().any(|p| p == id)
                || layer
                    .global_color()
                    .and_then(|name| globals.get(name))
                    .is_some_and(|g| g.depends_on(id))
        })
    }

    pub fn depends_on_slot(&self, slot: &LocalTextureSlot) -> bool {
        self.def
            .layers
            .iter()
            .any(|layer| layer.local_slots().any(|s| s == slot))
    }

    pub fn depends_on_global(&self, name: &str) -> bool {
        self.def
            .layers
            .iter()
            .any(|layer| layer.global_color() == Some(name))
    }

    /// Render all layers into the buffer (`NeedsUpdate -> Composited`).
    pub fn compose(&mut self, ctx: &ComposeContext<'_>) -> &Composite {
        let composite = compose(
            &self.def,
            self.visible,
            self.buffer.width(),
            self.buffer.height(),
            ctx,
        );
        self.buffer.store_composite(composite)
    }

    /// Snapshot the composite into an upload request (`Composited -> UploadPending`).
    pub fn begin_upload(&mut self, id: UploadId) -> Option<UploadRequest> {
        let (image, digest, quality) = self.buffer.begin_upload(id)?;
        Some(UploadRequest {
            id,
            region: self.def.region,
            quality,
            digest,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferState;
    use crate::color::{ColorOperation, ColorParam};
    use crate::image_cache::ImageCache;
    use crate::layer::{AlphaParam, ColorBase, LayerBlend, LayerSource, MaskSource};
    use appearance_params::ParamRegistry;
    use glam::Vec4;

    fn upper_body() -> LayerSetDef {
        let mut def = LayerSetDef::new(BakeRegion::UpperBody)
            .with_layer(
                TextureLayer::new("skin", LayerSource::Color, LayerBlend::DirectWrite)
                    .with_color_base(ColorBase::Global("skin".into())),
            )
            .with_layer(
                TextureLayer::new(
                    "shirt",
                    LayerSource::LocalTexture(LocalTextureSlot::new("upper_shirt")),
                    LayerBlend::Masked(MaskSource::LocalTexture(LocalTextureSlot::new("upper_shirt"))),
                )
                .with_alpha_param(AlphaParam::gradient(ParamId(20), "shirt_length.tga", 0.05)),
            );
        def.static_alpha = Some("upper_alpha.tga".into());
        def
    }

    #[test]
    fn dependency_sets() {
        let def = upper_body();
        assert_eq!(def.params(), BTreeSet::from([ParamId(20)]));
        assert_eq!(def.global_colors(), BTreeSet::from(["skin"]));
        assert_eq!(def.local_slots().len(), 1);
        assert_eq!(
            def.static_images(),
            BTreeSet::from(["shirt_length.tga", "upper_alpha.tga"])
        );
    }

    #[test]
    fn depends_through_global_color() {
        let set = TextureLayerSet::new(upper_body(), 4);
        let globals = BTreeMap::from([(
            "skin".to_string(),
            GlobalColor::new(
                "skin",
                vec![ColorParam::new(ParamId(5), ColorOperation::Add, vec![Vec4::ONE])],
            ),
        )]);
        assert!(set.depends_on_param(ParamId(5), &globals));
        assert!(set.depends_on_param(ParamId(20), &globals));
        assert!(!set.depends_on_param(ParamId(6), &globals));
        assert!(set.depends_on_slot(&LocalTextureSlot::new("upper_shirt")));
        assert!(set.depends_on_global("skin"));
    }

    #[test]
    fn compose_and_upload_snapshot() {
        let params = ParamRegistry::new();
        let globals = BTreeMap::new();
        let local = BTreeMap::new();
        let images = ImageCache::new(None);
        let ctx = ComposeContext {
            params: &params,
            globals: &globals,
            local_textures: &local,
            images: &images,
        };
        let mut set = TextureLayerSet::new(LayerSetDef::new(BakeRegion::Eyes), 4);
        assert_eq!(set.compose(&ctx).image.width(), 4);
        assert_eq!(set.buffer().state(), BufferState::Composited);
        let request = set.begin_upload(UploadId(3)).unwrap();
        assert_eq!(request.region, BakeRegion::Eyes);
        assert_eq!(set.buffer().state(), BufferState::UploadPending);
        assert!(set.begin_upload(UploadId(4)).is_none());
    }

    #[test]
    fn visibility_change_invalidates() {
        let mut set = TextureLayerSet::new(LayerSetDef::new(BakeRegion::Skirt), 2);
        assert!(set.set_visible(false));
        assert!(!set.set_visible(false));
        assert_eq!(set.buffer().state(), BufferState::NeedsUpdate);
    }
}
