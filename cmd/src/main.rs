use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use dataset::{GrayDepthSource, ply};
use pipeline::{ProjectOptions, SOLID_OPACITY_LOGIT, SolidifyOptions};

/// Single-image Gaussian splat tooling.
#[derive(Parser)]
#[command(name = "img2splat")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Back-project an image and its depth map into a point-cloud PLY
    Convert {
        /// Input image
        #[arg(short, long)]
        image: PathBuf,

        /// Grayscale relative depth map (brighter = closer)
        #[arg(short, long)]
        depth: PathBuf,

        /// Horizontal field of view in degrees
        #[arg(long, default_value_t = 55.0)]
        fov: f32,

        /// Upsample image and depth by this factor for a denser cloud
        #[arg(long)]
        densify: Option<u32>,

        /// Output PLY path
        #[arg(short, long, default_value = "output.ply")]
        output: PathBuf,
    },

    /// Turn a point-cloud PLY into solid splats
    Solidify {
        /// Input point-cloud PLY
        #[arg(short, long)]
        input: PathBuf,

        /// Force full opacity
        #[arg(long)]
        solid: bool,

        /// Explicit opacity logit (overrides --solid)
        #[arg(long)]
        opacity: Option<f32>,

        /// Uniform log-scale; per-point estimate when omitted
        #[arg(long)]
        scale: Option<f32>,

        /// Output PLY path
        #[arg(short, long, default_value = "mesh_gs.ply")]
        output: PathBuf,
    },

    /// Print a summary of a splat PLY
    Info {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match args.command {
        Command::Convert {
            image,
            depth,
            fov,
            densify,
            output,
        } => {
            let image = image::open(&image)
                .with_context(|| format!("reading image {}", image.display()))?
                .to_rgb8();
            let estimator = GrayDepthSource::new(depth);
            let opts = ProjectOptions {
                fov_degrees: fov,
                densify_factor: densify,
            };
            let cloud = pipeline::convert_image(&estimator, &image, &opts, &output)?;
            println!("wrote {} points to {}", cloud.len(), output.display());
        }

        Command::Solidify {
            input,
            solid,
            opacity,
            scale,
            output,
        } => {
            let cloud = ply::read_point_cloud(&input)
                .with_context(|| format!("reading cloud {}", input.display()))?;
            let opts = SolidifyOptions {
                opacity_logit: opacity.or(solid.then_some(SOLID_OPACITY_LOGIT)),
                log_scale: scale,
            };
            let splats = pipeline::solidify(&cloud, &opts)?;
            ply::write_splats(&splats, &output)?;
            println!(
                "wrote {} solid splats to {}",
                splats.num_splats(),
                output.display()
            );
        }

        Command::Info { input } => {
            let splats = ply::read_splats(&input)
                .with_context(|| format!("reading splats {}", input.display()))?;
            let act = splats.activated();
            let n = splats.num_splats();
            let mean_opacity = act.opacities.iter().sum::<f32>() / n.max(1) as f32;
            println!(
                "{}: {n} splats, mean opacity {mean_opacity:.3}",
                input.display()
            );
        }
    }
    Ok(())
}
