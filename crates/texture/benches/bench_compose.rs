use std::collections::BTreeMap;
use std::hint::black_box;
use std::time::Instant;

use appearance_common::{BakeRegion, LocalTextureSlot, ParamId, TextureQuality};
use appearance_params::{ParamRegistry, VisualParam};
use appearance_texture::{
    AlphaParam, ColorBase, ColorOperation, ColorParam, ComposeContext, GlobalColor, ImageCache,
    LayerBlend, LayerSetDef, LayerSource, LocalTexture, MaskSource, Raster, Rgba8, TextureLayer,
    compose,
};
use glam::Vec4;

fn gradient(size: u32) -> Raster {
    let mut r = Raster::new(size, size);
    for y in 0..size {
        for x in 0..size {
            let a = (x * 255 / size.max(1)) as u8;
            r.set_pixel(x, y, Rgba8::new(0, 0, 0, a));
        }
    }
    r
}

fn make_set(layer_count: usize) -> LayerSetDef {
    let mut def = LayerSetDef::new(BakeRegion::UpperBody).with_layer(
        TextureLayer::new("skin", LayerSource::Color, LayerBlend::DirectWrite)
            .with_color_base(ColorBase::Global("skin".into())),
    );
    for i in 0..layer_count {
        def = def.with_layer(
            TextureLayer::new(
                format!("cloth_{i}"),
                LayerSource::LocalTexture(LocalTextureSlot::new("upper_shirt")),
                LayerBlend::Masked(MaskSource::Visibility(true)),
            )
            .with_alpha_param(AlphaParam::gradient(ParamId(2), "gradient.tga", 0.05)),
        );
    }
    def.clear_alpha = true;
    def
}

fn bench_compose(size: u32, layer_count: usize, iterations: usize) {
    let mut params = ParamRegistry::new();
    let mut tone = VisualParam::new(ParamId(1), "skin_tone", 0.0, 1.0, 0.5).unwrap();
    tone.set_weight(0.7);
    params.add_visual(tone).unwrap();
    params
        .add_visual(VisualParam::new(ParamId(2), "shirt_length", 0.0, 1.0, 0.5).unwrap())
        .unwrap();

    let globals = BTreeMap::from([(
        "skin".to_string(),
        GlobalColor::new(
            "skin",
            vec![ColorParam::new(
                ParamId(1),
                ColorOperation::Add,
                vec![Vec4::new(0.4, 0.3, 0.2, 1.0), Vec4::new(0.9, 0.7, 0.6, 1.0)],
            )],
        ),
    )]);
    let local = BTreeMap::from([(
        LocalTextureSlot::new("upper_shirt"),
        LocalTexture::new(Raster::filled(256, 256, Rgba8::new(30, 60, 200, 255)), TextureQuality::Final),
    )]);
    let mut images = ImageCache::new(None);
    images.insert("gradient.tga", gradient(128));

    let ctx = ComposeContext {
        params: &params,
        globals: &globals,
        local_textures: &local,
        images: &images,
    };
    let set = make_set(layer_count);

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(compose(black_box(&set), true, size, size, &ctx));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  compose ({size}x{size}, {layer_count} layers, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Layer Set Compose Benchmarks ===\n");

    println!("Bake size:");
    bench_compose(128, 2, 50);
    bench_compose(256, 2, 20);
    bench_compose(512, 2, 5);

    println!("\nLayer count (256x256):");
    bench_compose(256, 1, 20);
    bench_compose(256, 4, 10);
    bench_compose(256, 8, 5);

    println!("\n=== Done ===");
}
