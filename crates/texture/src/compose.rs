use appearance_common::{LocalTextureSlot, TextureQuality};
use appearance_params::ParamRegistry;
use glam::Vec4;
use std::collections::BTreeMap;

use crate::color::{GlobalColor, normalized_weight};
use crate::image_cache::ImageCache;
use crate::layer::{AlphaParam, LayerBlend, LayerSource, MaskSource, TextureLayer};
use crate::layer_set::LayerSetDef;
use crate::raster::{LocalTexture, PixelDigest, Raster, Rgba8};

/// Everything a composite reads besides the layer definitions.
#[derive(Clone, Copy)]
pub struct ComposeContext<'a> {
    pub params: &'a ParamRegistry,
    pub globals: &'a BTreeMap<String, GlobalColor>,
    pub local_textures: &'a BTreeMap<LocalTextureSlot, LocalTexture>,
    pub images: &'a ImageCache,
}

impl<'a> ComposeContext<'a> {
    /// Look up a local texture, downgrading `quality` when it is missing or preview.
    fn local(&self, slot: &LocalTextureSlot, quality: &mut TextureQuality) -> Option<&'a Raster> {
        match self.local_textures.get(slot) {
            Some(tex) => {
                if tex.quality == TextureQuality::Preview {
                    *quality = TextureQuality::Preview;
                }
                Some(&tex.raster)
            }
            None => {
                tracing::trace!(%slot, "local texture not loaded; composite is preview");
                *quality = TextureQuality::Preview;
                None
            }
        }
    }

    fn image(&self, name: &str) -> Option<&'a Raster> {
        let image = self.images.get(name);
        if image.is_none() {
            tracing::debug!(image = name, "static image missing; layer input skipped");
        }
        image
    }
}

/// A finished layer-set composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    pub image: Raster,
    pub quality: TextureQuality,
    pub digest: PixelDigest,
    /// Product of every morph layer's mask, when the set has morph layers.
    pub morph_mask: Option<Vec<u8>>,
}

impl Composite {
    fn new(image: Raster, quality: TextureQuality, morph_mask: Option<Vec<u8>>) -> Self {
        let digest = image.digest();
        Self {
            image,
            quality,
            digest,
            morph_mask,
        }
    }
}

enum Pixels<'a> {
    Image(&'a Raster),
    Flat,
}

enum BaseMask<'a> {
    Image(&'a Raster),
    Constant(f32),
}

struct ResolvedAlpha<'a> {
    param: &'a AlphaParam,
    gradient: Option<&'a Raster>,
    weight: f32,
}

/// Render every layer of `set` in order into a `width` x `height` composite.
///
/// Pure in its inputs: identical layers, weights, and pixels give identical bytes.
pub fn compose(
    set: &LayerSetDef,
    visible: bool,
    width: u32,
    height: u32,
    ctx: &ComposeContext<'_>,
) -> Composite {
    let _span = tracing::info_span!("compose", region = %set.region).entered();

    if !visible {
        return Composite::new(Raster::new(width, height), TextureQuality::Final, None);
    }

    let count = width as usize * height as usize;
    let mut quality = TextureQuality::Final;
    let mut acc = vec![Vec4::ZERO; count];
    let mut morph = set.layers.iter().any(|l| l.morph).then(|| vec![1.0f32; count]);

    for layer in &set.layers {
        render_layer(
            layer,
            width,
            height,
            ctx,
            &mut acc,
            morph.as_deref_mut(),
            &mut quality,
        );
    }

    let static_alpha = set.static_alpha.as_deref().and_then(|name| ctx.image(name));
    if let Some(alpha) = static_alpha {
        for (i, px) in acc.iter_mut().enumerate() {
            let (x, y) = ((i % width as usize) as u32, (i / width as usize) as u32);
            px.w = alpha.sample_nearest(x, y, width, height).a as f32 / 255.0;
        }
    } else if set.clear_alpha {
        for px in &mut acc {
            px.w = 1.0;
        }
    }

    let pixels = acc.into_iter().map(Rgba8::from_vec4).collect();
    let morph_mask = morph.map(|m| {
        m.into_iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    });
    let composite = Composite::new(Raster::from_parts(width, height, pixels), quality, morph_mask);
    tracing::debug!(region = %set.region, ?quality, digest = %composite.digest, "layer set composited");
    composite
}

fn render_layer(
    layer: &TextureLayer,
    width: u32,
    height: u32,
    ctx: &ComposeContext<'_>,
    acc: &mut [Vec4],
    mut morph: Option<&mut [f32]>,
    quality: &mut TextureQuality,
) {
    let pixels = match &layer.source {
        LayerSource::LocalTexture(slot) => match ctx.local(slot, quality) {
            Some(r) => Pixels::Image(r),
            None => return,
        },
        LayerSource::StaticImage(name) => match ctx.image(name) {
            Some(r) => Pixels::Image(r),
            None => return,
        },
        LayerSource::Color => Pixels::Flat,
    };

    let base = match &layer.blend {
        LayerBlend::DirectWrite => None,
        LayerBlend::Masked(MaskSource::LocalTexture(slot)) => match ctx.local(slot, quality) {
            Some(r) => Some(BaseMask::Image(r)),
            None => return,
        },
        LayerBlend::Masked(MaskSource::StaticImage(name)) => match ctx.image(name) {
            Some(r) => Some(BaseMask::Image(r)),
            None => return,
        },
        LayerBlend::Masked(MaskSource::Visibility(visible)) => {
            Some(BaseMask::Constant(if *visible { 1.0 } else { 0.0 }))
        }
    };

    let alphas: Vec<ResolvedAlpha<'_>> = layer
        .alpha_params
        .iter()
        .filter(|a| !a.is_skipped(ctx.params))
        .filter_map(|a| {
            let gradient = match &a.image {
                Some(name) => Some(ctx.image(name)?),
                None => None,
            };
            Some(ResolvedAlpha {
                param: a,
                gradient,
                weight: normalized_weight(ctx.params, a.param),
            })
        })
        .collect();
    if !layer.alpha_params.is_empty() && alphas.is_empty() && !layer.morph {
        tracing::trace!(layer = %layer.name, "all alpha params skipped");
        return;
    }

    let (color, has_color) = layer.net_color(ctx.params, ctx.globals);
    let draw = !(has_color && color.w < 0.001);
    if !draw && !layer.morph {
        tracing::trace!(layer = %layer.name, "net color transparent; layer skipped");
        return;
    }

    let start = match alphas.first() {
        Some(a) if !a.param.multiply_blend => 0.0,
        _ => 1.0,
    };

    for y in 0..height {
        for x in 0..width {
            let i = y as usize * width as usize + x as usize;

            let mut mask = start;
            for a in &alphas {
                let c = match a.gradient {
                    Some(g) => a
                        .param
                        .gradient_lookup(g.sample_nearest(x, y, width, height).a, a.weight),
                    None => a.weight,
                };
                mask = if a.param.multiply_blend {
                    mask * c
                } else {
                    (mask + c).min(1.0)
                };
            }
            match &base {
                Some(BaseMask::Image(r)) => {
                    mask *= r.sample_nearest(x, y, width, height).a as f32 / 255.0;
                }
                Some(BaseMask::Constant(c)) => mask *= c,
                None => {}
            }

            if layer.morph {
                if let Some(m) = morph.as_deref_mut() {
                    m[i] *= mask;
                }
            }
            if !draw {
                continue;
            }

            let src = match pixels {
                Pixels::Image(r) => r.sample_nearest(x, y, width, height).to_vec4() * color,
                Pixels::Flat => color,
            };
            let dst = &mut acc[i];
            if base.is_none() {
                *dst = src;
            } else {
                let m = mask * color.w;
                let rgb = dst.truncate().lerp(src.truncate(), m);
                *dst = rgb.extend(m + dst.w * (1.0 - m));
            }
        }
    }
}
