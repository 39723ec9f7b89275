use appearance_common::{BakeRegion, LocalTextureSlot, ParamId};
use appearance_params::{Breakpoints, MorphDistortion, ParamDef};
use appearance_skeleton::{JointDef, SkeletonDef};
use appearance_texture::{
    AlphaParam, ColorBase, ColorOperation, ColorParam, GlobalColor, LayerBlend, LayerSetDef,
    LayerSource, MaskSource, TextureLayer,
};
use glam::{Vec3, Vec4};

use crate::defs::AppearanceDefs;

pub const SKIN_TONE: ParamId = ParamId(1);
pub const HAIR_COLOR: ParamId = ParamId(2);
pub const MUSCULAR: ParamId = ParamId(10);
pub const ARM_THICKNESS: ParamId = ParamId(11);
pub const CHEST_WIDTH: ParamId = ParamId(12);
pub const SHIRT_LENGTH: ParamId = ParamId(20);
pub const SHIRT_RED: ParamId = ParamId(21);
pub const PANTS_LENGTH: ParamId = ParamId(30);

pub const UPPER_SHIRT: &str = "upper_shirt";
pub const LOWER_PANTS: &str = "lower_pants";

fn skeleton() -> SkeletonDef {
    let joint = |name: &str, parent: Option<&str>, x: f32, y: f32, z: f32| {
        JointDef::new(name, parent, Vec3::new(x, y, z))
    };
    SkeletonDef {
        joints: vec![
            joint("mPelvis", None, 0.0, 0.0, 1.067),
            joint("mTorso", Some("mPelvis"), 0.0, 0.0, 0.084),
            joint("mChest", Some("mTorso"), -0.015, 0.0, 0.205),
            joint("mNeck", Some("mChest"), -0.01, 0.0, 0.251),
            joint("mHead", Some("mNeck"), 0.0, 0.0, 0.076),
            joint("mCollarLeft", Some("mChest"), -0.021, 0.085, 0.165),
            joint("mShoulderLeft", Some("mCollarLeft"), 0.0, 0.079, 0.0),
            joint("mElbowLeft", Some("mShoulderLeft"), 0.0, 0.248, 0.0),
            joint("mWristLeft", Some("mElbowLeft"), 0.0, 0.205, 0.0),
            joint("mHipLeft", Some("mPelvis"), 0.034, 0.127, -0.041),
            joint("mKneeLeft", Some("mHipLeft"), -0.001, -0.046, -0.491),
            joint("mAnkleLeft", Some("mKneeLeft"), -0.029, 0.001, -0.468),
        ],
    }
}

fn params() -> Vec<ParamDef> {
    vec![
        ParamDef::new(SKIN_TONE.0, "skin_tone", 0.0, 1.0, 0.5),
        ParamDef::new(HAIR_COLOR.0, "hair_color", 0.0, 1.0, 0.3),
        ParamDef::new(MUSCULAR.0, "muscular", 0.0, 1.0, 0.0)
            .driving(ARM_THICKNESS.0, None)
            .driving(CHEST_WIDTH.0, Some(Breakpoints::new(0.0, 0.5, 0.5, 1.0))),
        ParamDef {
            distortion: Some(MorphDistortion::new(vec![
                Vec3::new(0.0, 0.01, 0.0),
                Vec3::new(0.0, 0.02, 0.005),
                Vec3::new(0.0, 0.015, -0.005),
            ])),
            ..ParamDef::new(ARM_THICKNESS.0, "arm_thickness", 0.0, 2.0, 0.0)
        },
        ParamDef::new(CHEST_WIDTH.0, "chest_width", -1.0, 1.0, -1.0),
        ParamDef::new(SHIRT_LENGTH.0, "shirt_length", 0.0, 1.0, 0.8),
        ParamDef::new(SHIRT_RED.0, "shirt_red", 0.0, 1.0, 0.0),
        ParamDef::new(PANTS_LENGTH.0, "pants_length", 0.0, 1.0, 1.0),
    ]
}

fn global_colors() -> Vec<GlobalColor> {
    vec![
        GlobalColor::new(
            "skin",
            vec![ColorParam::new(
                SKIN_TONE,
                ColorOperation::Add,
                vec![Vec4::new(0.96, 0.80, 0.69, 1.0), Vec4::new(0.36, 0.22, 0.15, 1.0)],
            )],
        ),
        GlobalColor::new(
            "hair",
            vec![ColorParam::new(
                HAIR_COLOR,
                ColorOperation::Add,
                vec![
                    Vec4::new(0.95, 0.85, 0.55, 1.0),
                    Vec4::new(0.45, 0.25, 0.10, 1.0),
                    Vec4::new(0.08, 0.06, 0.05, 1.0),
                ],
            )],
        ),
    ]
}

fn skin_layer() -> TextureLayer {
    TextureLayer::new("skin", LayerSource::Color, LayerBlend::DirectWrite)
        .with_color_base(ColorBase::Global("skin".into()))
}

fn layer_sets() -> Vec<LayerSetDef> {
    let mut head = LayerSetDef::new(BakeRegion::Head).with_layer(skin_layer());
    head.clear_alpha = true;

    let mut upper = LayerSetDef::new(BakeRegion::UpperBody)
        .with_layer(skin_layer())
        .with_layer(
            TextureLayer::new(
                "shirt",
                LayerSource::LocalTexture(LocalTextureSlot::new(UPPER_SHIRT)),
                LayerBlend::Masked(MaskSource::Visibility(true)),
            )
            .with_color_base(ColorBase::Fixed(Vec4::ONE))
            .with_color_param(ColorParam::new(
                SHIRT_RED,
                ColorOperation::Blend,
                vec![Vec4::new(0.8, 0.1, 0.1, 1.0)],
            ))
            .with_alpha_param(AlphaParam::uniform(SHIRT_LENGTH)),
        );
    upper.clear_alpha = true;

    let mut pants_alpha = AlphaParam::uniform(PANTS_LENGTH);
    pants_alpha.skip_if_zero = true;
    let mut lower = LayerSetDef::new(BakeRegion::LowerBody)
        .with_layer(skin_layer())
        .with_layer(
            TextureLayer::new(
                "pants",
                LayerSource::LocalTexture(LocalTextureSlot::new(LOWER_PANTS)),
                LayerBlend::Masked(MaskSource::Visibility(true)),
            )
            .with_alpha_param(pants_alpha),
        );
    lower.clear_alpha = true;

    let eyes = LayerSetDef::new(BakeRegion::Eyes).with_layer(
        TextureLayer::new("iris", LayerSource::Color, LayerBlend::DirectWrite)
            .with_color_base(ColorBase::Fixed(Vec4::new(0.30, 0.50, 0.80, 1.0))),
    );

    let hair = LayerSetDef::new(BakeRegion::Hair).with_layer(
        TextureLayer::new(
            "hair",
            LayerSource::Color,
            LayerBlend::Masked(MaskSource::Visibility(true)),
        )
        .with_color_base(ColorBase::Global("hair".into()))
        .morph_contributor(),
    );

    vec![head, upper, lower, eyes, hair]
}

impl AppearanceDefs {
    /// A small but complete avatar: a Z-up biped half-skeleton, one driver with
    /// two targets, skin and hair colors, and five baked regions.
    ///
    /// Layers reference no static image files, so it bakes without an image root.
    pub fn sample() -> Self {
        Self {
            skeleton: skeleton(),
            params: params(),
            global_colors: global_colors(),
            layer_sets: layer_sets(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appearance_params::ParamRegistry;

    #[test]
    fn sample_builds_every_part() {
        let defs = AppearanceDefs::sample();
        let skeleton = defs.skeleton.build().unwrap();
        assert_eq!(skeleton.len(), 12);
        let (registry, report) = ParamRegistry::from_defs(&defs.params).unwrap();
        assert!(report.is_clean());
        assert_eq!(registry.driver_of(CHEST_WIDTH), Some(MUSCULAR));
        assert!(defs.static_images().is_empty());
    }

    #[test]
    fn sample_regions_are_distinct() {
        let defs = AppearanceDefs::sample();
        let regions: Vec<BakeRegion> = defs.layer_sets.iter().map(|s| s.region).collect();
        assert_eq!(
            regions,
            vec![
                BakeRegion::Head,
                BakeRegion::UpperBody,
                BakeRegion::LowerBody,
                BakeRegion::Eyes,
                BakeRegion::Hair,
            ]
        );
    }
}
