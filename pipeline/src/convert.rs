use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use dataset::{DepthEstimator, PointCloud, densify, ply, project_to_cloud};

use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectOptions {
    pub fov_degrees: f32,

    /// Upsample image and depth by this factor before projection. A factor
    /// of 2 quadruples the point count and shrinks the gaps between
    /// neighboring splats.
    pub densify_factor: Option<u32>,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            fov_degrees: 55.0,
            densify_factor: None,
        }
    }
}

/// Estimate depth for `image` and back-project it into a point cloud.
pub fn image_to_cloud(
    estimator: &dyn DepthEstimator,
    image: &RgbImage,
    opts: &ProjectOptions,
) -> Result<PointCloud, PipelineError> {
    let depth = estimator.estimate(image)?;

    let cloud = match opts.densify_factor {
        Some(factor) if factor > 1 => {
            let (dense_image, dense_depth) = densify(image, &depth, factor)?;
            project_to_cloud(&dense_image, &dense_depth, opts.fov_degrees)?
        }
        _ => project_to_cloud(image, &depth, opts.fov_degrees)?,
    };
    log::info!("projected {} points", cloud.len());
    Ok(cloud)
}

/// The no-optimization path: image -> depth -> cloud -> plain-mode PLY.
pub fn convert_image(
    estimator: &dyn DepthEstimator,
    image: &RgbImage,
    opts: &ProjectOptions,
    output: &Path,
) -> Result<PointCloud, PipelineError> {
    let cloud = image_to_cloud(estimator, image, opts)?;
    ply::write_point_cloud(&cloud, output).map_err(PipelineError::Serialization)?;
    log::info!("wrote {} points to {}", cloud.len(), output.display());
    Ok(cloud)
}
