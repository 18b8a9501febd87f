use ball_tree::BallTree;
use glam::Vec3;

use crate::SceneError;
use crate::activation::{normalize_quat, rgb_to_sh0, sh0_to_rgb, sigmoid};

/// Log-scale every splat starts with; exp(-5) is a small sphere of roughly
/// 0.0067 units.
pub const INIT_LOG_SCALE: f32 = -5.0;

/// Raw opacity every splat starts with; sigmoid(0) = 0.5.
pub const INIT_RAW_OPACITY: f32 = 0.0;

const IDENTITY_ROTATION: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

/// The trainable splat set, stored struct-of-arrays.
///
/// All five attribute arrays share the same splat count, fixed at
/// construction. Attributes are stored raw (pre-activation): scales in log
/// space, rotations as unnormalized w-x-y-z quaternions, opacities as
/// logits, colors as degree-0 SH coefficients.
#[derive(Debug, Clone)]
pub struct Splats {
    means: Vec<Vec3>,
    log_scales: Vec<Vec3>,
    rotations: Vec<[f32; 4]>,
    raw_opacities: Vec<f32>,
    sh0: Vec<Vec3>,
}

/// Physical (activated) attribute snapshot handed to rasterizers.
#[derive(Debug, Clone)]
pub struct ActivatedSplats {
    pub means: Vec<Vec3>,
    /// Strictly positive per-axis scales, `exp(log_scale)`.
    pub scales: Vec<Vec3>,
    /// Unit-norm w-x-y-z quaternions.
    pub rotations: Vec<[f32; 4]>,
    /// Opacities in (0, 1).
    pub opacities: Vec<f32>,
    /// RGB in [0, 1] barring out-of-range SH coefficients.
    pub colors: Vec<Vec3>,
}

/// How a cloud was recentered and rescaled by [`Splats::normalize_to_unit_sphere`].
#[derive(Debug, Clone, Copy)]
pub struct NormalizeInfo {
    pub center: Vec3,
    pub radius: f32,
    pub scale_factor: f32,
}

impl Splats {
    /// Seed a splat per input point: identity rotation, small uniform scale,
    /// half opacity, SH0 matching the input color.
    ///
    /// Positions and colors are copied; later mutation of the inputs does not
    /// touch the store.
    pub fn from_point_cloud(points: &[Vec3], colors: &[Vec3]) -> Result<Self, SceneError> {
        if points.len() != colors.len() {
            return Err(SceneError::ShapeMismatch {
                name: "colors",
                got: colors.len(),
                expected: points.len(),
            });
        }
        let n = points.len();
        Ok(Self {
            means: points.to_vec(),
            log_scales: vec![Vec3::splat(INIT_LOG_SCALE); n],
            rotations: vec![IDENTITY_ROTATION; n],
            raw_opacities: vec![INIT_RAW_OPACITY; n],
            sh0: colors.iter().map(|&c| rgb_to_sh0(c)).collect(),
        })
    }

    /// Rebuild a store from raw attribute arrays, e.g. parsed from a splat
    /// PLY. Every array must have the same length.
    pub fn from_raw_parts(
        means: Vec<Vec3>,
        log_scales: Vec<Vec3>,
        rotations: Vec<[f32; 4]>,
        raw_opacities: Vec<f32>,
        sh0: Vec<Vec3>,
    ) -> Result<Self, SceneError> {
        let n = means.len();
        let check = |name: &'static str, got: usize| {
            if got == n {
                Ok(())
            } else {
                Err(SceneError::ShapeMismatch {
                    name,
                    got,
                    expected: n,
                })
            }
        };
        check("log_scales", log_scales.len())?;
        check("rotations", rotations.len())?;
        check("raw_opacities", raw_opacities.len())?;
        check("sh0", sh0.len())?;
        Ok(Self {
            means,
            log_scales,
            rotations,
            raw_opacities,
            sh0,
        })
    }

    pub fn num_splats(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[Vec3] {
        &self.means
    }

    pub fn log_scales(&self) -> &[Vec3] {
        &self.log_scales
    }

    pub fn rotations(&self) -> &[[f32; 4]] {
        &self.rotations
    }

    pub fn raw_opacities(&self) -> &[f32] {
        &self.raw_opacities
    }

    pub fn sh0(&self) -> &[Vec3] {
        &self.sh0
    }

    // Mutable views are slices so the splat count stays fixed.

    pub fn means_mut(&mut self) -> &mut [Vec3] {
        &mut self.means
    }

    pub fn log_scales_mut(&mut self) -> &mut [Vec3] {
        &mut self.log_scales
    }

    pub fn rotations_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.rotations
    }

    pub fn raw_opacities_mut(&mut self) -> &mut [f32] {
        &mut self.raw_opacities
    }

    pub fn sh0_mut(&mut self) -> &mut [Vec3] {
        &mut self.sh0
    }

    /// Bulk-set every log-scale to one value. A plain write, not an
    /// optimization step; optimizer moments are untouched.
    pub fn set_uniform_log_scale(&mut self, value: f32) {
        self.log_scales.fill(Vec3::splat(value));
    }

    /// Bulk-set every raw opacity to one value.
    pub fn set_uniform_raw_opacity(&mut self, value: f32) {
        self.raw_opacities.fill(value);
    }

    /// Decode the raw store into physical attributes.
    pub fn activated(&self) -> ActivatedSplats {
        ActivatedSplats {
            means: self.means.clone(),
            scales: self
                .log_scales
                .iter()
                .map(|s| Vec3::new(s.x.exp(), s.y.exp(), s.z.exp()))
                .collect(),
            rotations: self.rotations.iter().map(|&q| normalize_quat(q)).collect(),
            opacities: self.raw_opacities.iter().map(|&o| sigmoid(o)).collect(),
            colors: self.sh0.iter().map(|&c| sh0_to_rgb(c)).collect(),
        }
    }

    /// Estimate a per-splat log-scale from the mean distance to the nearest
    /// neighbors, so neighboring splats slightly overlap. Used when a point
    /// cloud arrives without any scale information.
    pub fn estimate_log_scales_from_neighbors(&mut self) {
        let tree_pos: Vec<[f64; 3]> = self
            .means
            .iter()
            .map(|v| [v.x as f64, v.y as f64, v.z as f64])
            .collect();

        let empty = vec![(); tree_pos.len()];
        let tree = BallTree::new(tree_pos.clone(), empty);

        for (log_scale, p) in self.log_scales.iter_mut().zip(&tree_pos) {
            // Half the average of the 2 nearest distances (skipping self).
            let extent = 0.5 * tree.query().nn(p).skip(1).take(2).map(|x| x.1).sum::<f64>() / 2.0;
            *log_scale = Vec3::splat(extent.max(1e-12).ln() as f32);
        }
    }

    /// Center the cloud on its centroid and scale it to fit the unit sphere.
    /// Scales are shifted by the same factor so splat footprints keep their
    /// proportion to the geometry.
    pub fn normalize_to_unit_sphere(&mut self) -> NormalizeInfo {
        let n = self.means.len().max(1) as f32;
        let center = self.means.iter().copied().sum::<Vec3>() / n;

        let mut radius = 0.0f32;
        for m in &mut self.means {
            *m -= center;
            radius = radius.max(m.length());
        }
        let scale_factor = if radius > 0.0 { 1.0 / radius } else { 1.0 };
        for m in &mut self.means {
            *m *= scale_factor;
        }
        let log_shift = scale_factor.ln();
        for s in &mut self.log_scales {
            *s += Vec3::splat(log_shift);
        }

        NormalizeInfo {
            center,
            radius,
            scale_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::SH_C0;

    fn grid_cloud(side: usize, spacing: f32) -> Vec<Vec3> {
        let mut points = vec![];
        for z in 0..side {
            for y in 0..side {
                for x in 0..side {
                    points.push(Vec3::new(x as f32, y as f32, z as f32) * spacing);
                }
            }
        }
        points
    }

    #[test]
    fn init_values() {
        let points = vec![Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO];
        let colors = vec![Vec3::splat(0.5), Vec3::ONE];
        let splats = Splats::from_point_cloud(&points, &colors).unwrap();

        assert_eq!(splats.num_splats(), 2);
        assert_eq!(splats.log_scales()[0], Vec3::splat(-5.0));
        assert_eq!(splats.rotations()[1], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(splats.raw_opacities()[0], 0.0);
        // rgb 0.5 maps to sh0 exactly 0.
        assert!(splats.sh0()[0].length() < 1e-6);
        assert!((splats.sh0()[1].x - 0.5 / SH_C0).abs() < 1e-5);
    }

    #[test]
    fn init_copies_points() {
        let mut points = vec![Vec3::ZERO];
        let colors = vec![Vec3::ZERO];
        let splats = Splats::from_point_cloud(&points, &colors).unwrap();
        points[0] = Vec3::splat(9.0);
        assert_eq!(splats.means()[0], Vec3::ZERO);
    }

    #[test]
    fn mismatched_colors_rejected() {
        let err = Splats::from_point_cloud(&[Vec3::ZERO], &[]).unwrap_err();
        assert!(matches!(err, SceneError::ShapeMismatch { .. }));
    }

    #[test]
    fn activation_invariants() {
        let points = grid_cloud(3, 0.5);
        let colors = vec![Vec3::splat(0.25); points.len()];
        let mut splats = Splats::from_point_cloud(&points, &colors).unwrap();
        // Perturb rotations away from identity to make normalization matter.
        for (i, q) in splats.rotations_mut().iter_mut().enumerate() {
            q[1] = 0.1 * i as f32;
            q[3] = -0.05 * i as f32;
        }

        let act = splats.activated();
        for i in 0..splats.num_splats() {
            assert!(act.scales[i].min_element() > 0.0);
            assert!(act.opacities[i] > 0.0 && act.opacities[i] < 1.0);
            let norm: f32 = act.rotations[i].iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn uniform_opacity_override_hits_every_splat() {
        let points = grid_cloud(2, 1.0);
        let colors = vec![Vec3::splat(0.5); points.len()];
        let mut splats = Splats::from_point_cloud(&points, &colors).unwrap();
        splats.set_uniform_raw_opacity(10.0);

        for &o in &splats.activated().opacities {
            assert!((o - sigmoid(10.0)).abs() < 1e-6);
            assert!(o > 0.9999);
        }
    }

    #[test]
    fn neighbor_scales_finite_and_overlapping() {
        let points = grid_cloud(3, 1.0);
        let colors = vec![Vec3::splat(0.5); points.len()];
        let mut splats = Splats::from_point_cloud(&points, &colors).unwrap();
        splats.estimate_log_scales_from_neighbors();

        for s in splats.log_scales() {
            assert!(s.x.is_finite());
            // Unit-spaced grid: half the nearest distance is 0.5, log < 0.
            assert!(s.x < 0.0);
        }
    }

    #[test]
    fn unit_sphere_normalization() {
        let points = vec![
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(14.0, 0.0, 0.0),
            Vec3::new(12.0, 2.0, 0.0),
        ];
        let colors = vec![Vec3::splat(0.5); 3];
        let mut splats = Splats::from_point_cloud(&points, &colors).unwrap();
        let info = splats.normalize_to_unit_sphere();

        let centroid = splats.means().iter().copied().sum::<Vec3>() / 3.0;
        assert!(centroid.length() < 1e-5);
        let max_r = splats
            .means()
            .iter()
            .map(|m| m.length())
            .fold(0.0f32, f32::max);
        assert!((max_r - 1.0).abs() < 1e-5);
        assert!((info.center - Vec3::new(12.0, 2.0 / 3.0, 0.0)).length() < 1e-4);
    }
}
