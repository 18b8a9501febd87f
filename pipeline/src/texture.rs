use std::path::Path;

use glam::Vec3;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use dataset::rgb8_to_f32;
use render::Rasterizer;
use scene::{Camera, Intrinsics, Splats};
use train::{SplatTrainer, TrainConfig};

use crate::error::PipelineError;
use crate::optimize::optimize;
use crate::solidify::SOLID_OPACITY_LOGIT;

/// Starting color for untextured geometry. Gray shows contrast against both
/// light and dark targets, which makes a stalled optimization obvious.
const INIT_GRAY: f32 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureOptions {
    pub iterations: u32,

    /// Color-only learning rate; higher than the default SH0 rate since
    /// nothing else is moving.
    pub color_lr: f64,

    /// Camera distance from the normalized (unit-radius) cloud. 2.5 radii
    /// keeps the whole object in frame at moderate fields of view.
    pub camera_distance: f32,

    pub fov_degrees: f32,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            iterations: 200,
            color_lr: 0.02,
            camera_distance: 2.5,
            fov_degrees: 55.0,
        }
    }
}

/// Project an image's colors onto fixed geometry.
///
/// The cloud is centered and scaled to the unit sphere, made solid, and
/// only the SH0 colors are optimized against the image from a camera on the
/// +Z axis. Returns the textured splats and the final loss.
pub fn texture_cloud(
    positions: &[Vec3],
    image: &RgbImage,
    raster: &mut dyn Rasterizer,
    opts: &TextureOptions,
    error_record_dir: Option<&Path>,
) -> Result<(Splats, f32), PipelineError> {
    let colors = vec![Vec3::splat(INIT_GRAY); positions.len()];
    let mut splats = Splats::from_point_cloud(positions, &colors)?;

    let info = splats.normalize_to_unit_sphere();
    log::info!(
        "normalized cloud: center {:?}, radius {:.3}",
        info.center,
        info.radius
    );
    splats.estimate_log_scales_from_neighbors();
    splats.set_uniform_raw_opacity(SOLID_OPACITY_LOGIT);

    let (width, height) = image.dimensions();
    let camera = Camera::looking_from_z(
        opts.camera_distance,
        Intrinsics::from_fov(width, height, opts.fov_degrees),
    );
    let gt_image = rgb8_to_f32(image);

    let mut trainer = SplatTrainer::new(TrainConfig::default());
    trainer.switch_to_color_only(opts.color_lr);

    let loss = optimize(
        &mut splats,
        &mut trainer,
        raster,
        &gt_image,
        &camera,
        opts.iterations,
        error_record_dir,
    )?;
    Ok((splats, loss))
}
