use serde::{Deserialize, Serialize};

use dataset::PointCloud;
use scene::Splats;

use crate::error::PipelineError;

/// Opacity logit for a fully solid look; sigmoid(10) is effectively 1.
pub const SOLID_OPACITY_LOGIT: f32 = 10.0;

/// Default opacity logit for mesh-derived splats; sigmoid(5) is roughly
/// 0.99, quite solid but not forced.
pub const DEFAULT_MESH_OPACITY_LOGIT: f32 = 5.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolidifyOptions {
    /// Forced uniform opacity logit; `None` picks
    /// [`DEFAULT_MESH_OPACITY_LOGIT`].
    pub opacity_logit: Option<f32>,

    /// Forced uniform log-scale; `None` estimates a per-point scale from
    /// nearest-neighbor distances so splats slightly overlap.
    pub log_scale: Option<f32>,
}

/// Turn an externally sampled point cloud (e.g. from a mesh surface) into a
/// solid-looking splat set, bypassing learned geometry.
pub fn solidify(cloud: &PointCloud, opts: &SolidifyOptions) -> Result<Splats, PipelineError> {
    let mut splats = Splats::from_point_cloud(cloud.positions(), cloud.colors())?;

    match opts.log_scale {
        Some(value) => splats.set_uniform_log_scale(value),
        None => splats.estimate_log_scales_from_neighbors(),
    }
    splats.set_uniform_raw_opacity(opts.opacity_logit.unwrap_or(DEFAULT_MESH_OPACITY_LOGIT));

    Ok(splats)
}
