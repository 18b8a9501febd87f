use glam::Vec3;
use image::RgbImage;
use image::imageops::{self, FilterType};
use scene::Intrinsics;

use crate::depth::DepthMap;
use crate::error::DatasetError;
use crate::point_cloud::PointCloud;

/// Guards the disparity normalization against a flat depth map
/// (min == max). A degenerate map collapses to a single depth shell instead
/// of dividing by zero.
pub const DEPTH_RANGE_EPS: f32 = 1e-8;

/// Added to normalized disparity before inversion so the farthest pixels
/// stay at a finite depth. Tunable, chosen empirically.
pub const DISPARITY_EPS: f32 = 0.05;

/// Scales inverted disparity to keep scene coordinates manageable relative
/// to the image width. Tunable, chosen empirically.
pub const DEPTH_SCALE: f32 = 5.0;

/// Back-project an image and its relative depth map into a camera-space
/// point cloud.
///
/// Returns exactly width x height points in row-major pixel order, colors
/// index-aligned and normalized to [0, 1]. The only failure mode is an
/// image/depth size mismatch; the transform itself always succeeds.
pub fn project_to_cloud(
    image: &RgbImage,
    depth: &DepthMap,
    fov_degrees: f32,
) -> Result<PointCloud, DatasetError> {
    let (width, height) = image.dimensions();
    if (depth.width(), depth.height()) != (width, height) {
        return Err(DatasetError::ShapeMismatch(format!(
            "image is {width}x{height} but depth map is {}x{}",
            depth.width(),
            depth.height()
        )));
    }

    let k = Intrinsics::from_fov(width, height, fov_degrees);

    let (depth_min, depth_max) = depth.min_max();
    let range = depth_max - depth_min + DEPTH_RANGE_EPS;

    let mut positions = Vec::with_capacity((width * height) as usize);
    let mut colors = Vec::with_capacity((width * height) as usize);

    for v in 0..height {
        for u in 0..width {
            // Relative depth -> [0, 1] disparity -> metric-like Z.
            let disparity = (depth.get(u, v) - depth_min) / range;
            let z = 1.0 / (disparity + DISPARITY_EPS) * DEPTH_SCALE;

            let x = (u as f32 - k.cx) * z / k.fx;
            let y = (v as f32 - k.cy) * z / k.fy;
            positions.push(Vec3::new(x, y, z));

            let px = image.get_pixel(u, v);
            colors.push(Vec3::new(
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ));
        }
    }

    PointCloud::new(positions, colors)
}

/// Upsample image and depth together before projection to shrink the gaps
/// between neighboring points. A factor of 2 quadruples the point count.
pub fn densify(
    image: &RgbImage,
    depth: &DepthMap,
    factor: u32,
) -> Result<(RgbImage, DepthMap), DatasetError> {
    if factor == 0 {
        return Err(DatasetError::ShapeMismatch(
            "densify factor must be at least 1".to_owned(),
        ));
    }
    let (w, h) = image.dimensions();
    let (new_w, new_h) = (w * factor, h * factor);
    let dense_image = imageops::resize(image, new_w, new_h, FilterType::CatmullRom);
    let dense_depth = depth.resized(new_w, new_h);
    Ok((dense_image, dense_depth))
}
