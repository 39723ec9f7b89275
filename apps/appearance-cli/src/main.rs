use std::path::PathBuf;

use anyhow::Context;
use appearance_assets::AppearanceDefs;
use appearance_avatar::{AppearanceConfig, AvatarAppearance};
use appearance_common::{LocalTextureSlot, TextureQuality, Transform};
use appearance_params::{Breakpoints, WeightRange, driven_weight};
use appearance_skeleton::Skeleton;
use appearance_texture::{LocalTexture, LoopbackUploader, Raster, Rgba8};
use appearance_tools::AppearanceInspector;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "appearance-cli", about = "CLI tool for avatar appearance operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Rotate a two-joint chain about Z and print world positions
    Joints {
        /// Root rotation in degrees
        #[arg(short, long, default_value = "90")]
        angle: f32,
    },
    /// Tabulate a driver-to-driven mapping
    Drive {
        /// Breakpoints min1,max1,max2,min2 (defaults to a full-range ramp)
        #[arg(short, long, value_delimiter = ',', num_args = 4)]
        breakpoints: Option<Vec<f32>>,
        /// Driven parameter range min,max
        #[arg(short, long, value_delimiter = ',', num_args = 2, default_value = "0,1")]
        driven: Vec<f32>,
        /// Number of samples across the driver range [0, 1]
        #[arg(short, long, default_value = "11")]
        steps: usize,
    },
    /// Write the built-in sample definitions as JSON
    SampleDefs {
        #[arg(short, long, default_value = "appearance.json")]
        out: PathBuf,
    },
    /// Build an avatar, bake every layer set through a loopback uploader
    Bake {
        /// Definitions JSON (defaults to the built-in sample)
        #[arg(short, long)]
        defs: Option<PathBuf>,
        /// Bake configuration YAML
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Supply a flat final-quality texture for every local texture slot
        #[arg(long)]
        fill_local: bool,
        /// Directory to write one PNG per region into
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Maximum number of pumps
        #[arg(long, default_value = "32")]
        frames: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("appearance-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", appearance_common::crate_info());
            println!("skeleton: {}", appearance_skeleton::crate_info());
            println!("params: {}", appearance_params::crate_info());
            println!("texture: {}", appearance_texture::crate_info());
            println!("assets: {}", appearance_assets::crate_info());
            println!("avatar: {}", appearance_avatar::crate_info());
            println!("tools: {}", appearance_tools::crate_info());
        }
        Commands::Joints { angle } => {
            let mut skeleton = Skeleton::new();
            let root = skeleton.add_joint("root", None, Transform::default())?;
            let tip = skeleton.add_joint(
                "tip",
                Some(root),
                Transform {
                    position: glam::Vec3::Y,
                    ..Transform::default()
                },
            )?;
            println!("before: tip={:.3}", skeleton.world_position(tip)?);
            skeleton.set_rotation(root, glam::Quat::from_rotation_z(angle.to_radians()))?;
            println!(
                "after {angle} deg about Z: tip={:.3}",
                skeleton.world_position(tip)?
            );
        }
        Commands::Drive {
            breakpoints,
            driven,
            steps,
        } => {
            let driver = WeightRange::new(0.0, 1.0);
            let driven = WeightRange::new(driven[0], driven[1]);
            let bp = match breakpoints {
                Some(v) => Breakpoints::new(v[0], v[1], v[2], v[3]),
                None => Breakpoints::full_range(driver),
            };
            anyhow::ensure!(bp.is_ordered(), "breakpoints must satisfy min1 <= max1 <= max2 <= min2");
            let steps = steps.max(2);
            println!("driver -> driven ({:?})", bp);
            for i in 0..steps {
                let input = i as f32 / (steps - 1) as f32;
                println!("{input:>6.3} -> {:>7.3}", driven_weight(&bp, driver, driven, input));
            }
        }
        Commands::SampleDefs { out } => {
            let defs = AppearanceDefs::sample();
            defs.save(&out)?;
            println!(
                "Wrote {} (fingerprint={:#x})",
                out.display(),
                defs.fingerprint()?
            );
        }
        Commands::Bake {
            defs,
            config,
            fill_local,
            out,
            frames,
        } => {
            let defs = match defs {
                Some(path) => AppearanceDefs::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => AppearanceDefs::sample(),
            };
            let config = match config {
                Some(path) => AppearanceConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => AppearanceConfig::default(),
            };

            let (mut avatar, report) = AvatarAppearance::from_defs(&defs, config)?;
            for skipped in &report.skipped {
                println!("skipped link: {skipped:?}");
            }

            if fill_local {
                let slots: Vec<LocalTextureSlot> = defs
                    .layer_sets
                    .iter()
                    .flat_map(|s| s.local_slots())
                    .cloned()
                    .collect();
                for slot in slots {
                    let flat = Raster::filled(1, 1, Rgba8::new(128, 128, 128, 255));
                    avatar.set_local_texture(slot, LocalTexture::new(flat, TextureQuality::Final));
                }
            }

            let mut uploader = LoopbackUploader::new();
            let pumps = avatar.pump_until_idle(&mut uploader, frames);
            if !avatar.is_settled() {
                tracing::warn!(pumps, "bake did not settle; some sets wait on final textures or are held");
            }
            println!("{}", AppearanceInspector::summary(&avatar));
            println!("pumps={pumps} uploads={}", uploader.requests().len());
            for info in AppearanceInspector::layer_sets(&avatar) {
                println!("  {info}");
            }

            if let Some(dir) = out {
                std::fs::create_dir_all(&dir)?;
                for set in avatar.layer_sets() {
                    if let Some(composite) = set.buffer().composite() {
                        let path = dir.join(format!("{}.png", set.region()));
                        composite.image.save(&path)?;
                        println!("Wrote {} ({})", path.display(), composite.digest);
                    }
                }
            }
        }
    }

    Ok(())
}
