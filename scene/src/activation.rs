//! Activations mapping raw (stored, optimized) splat attributes to their
//! physical values, plus the matching chain-rule companions used when
//! gradients flow back from a rasterizer.
//!
//! These are free functions on purpose: tests and the trainer call them
//! directly without going through a render.

use glam::Vec3;

/// Degree-0 spherical harmonic basis constant. Physical RGB is
/// `sh0 * SH_C0 + 0.5`.
pub const SH_C0: f32 = 0.28209479177387814;

// Quaternion rows are clamped to this norm before dividing. Raw rotations
// start at the identity quaternion, so a row this small indicates a defect
// upstream, not a valid state.
const MIN_QUAT_NORM: f32 = 1e-32;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn inverse_sigmoid(x: f32) -> f32 {
    (x / (1.0 - x)).ln()
}

/// Normalize a raw w-x-y-z quaternion row to unit length.
pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let norm_sq: f32 = q.iter().map(|v| v * v).sum();
    debug_assert!(
        norm_sq > MIN_QUAT_NORM,
        "zero-norm rotation row, raw quaternion state is corrupt"
    );
    let norm = norm_sq.sqrt().max(MIN_QUAT_NORM);
    q.map(|v| v / norm)
}

pub fn sh0_to_rgb(sh0: Vec3) -> Vec3 {
    sh0 * SH_C0 + 0.5
}

pub fn rgb_to_sh0(rgb: Vec3) -> Vec3 {
    (rgb - 0.5) / SH_C0
}

/// d(exp(x))/dx applied to an upstream gradient.
pub fn d_exp(x: Vec3, upstream: Vec3) -> Vec3 {
    upstream * Vec3::new(x.x.exp(), x.y.exp(), x.z.exp())
}

/// d(sigmoid(x))/dx applied to an upstream gradient.
pub fn d_sigmoid(x: f32, upstream: f32) -> f32 {
    let s = sigmoid(x);
    upstream * s * (1.0 - s)
}

/// Pull a gradient w.r.t. the unit quaternion back to the raw row.
///
/// For `q_hat = q / ||q||` the Jacobian is `(I - q_hat q_hat^T) / ||q||`,
/// i.e. the component of the upstream gradient along `q_hat` is discarded
/// and the rest is rescaled.
pub fn d_normalize_quat(q: [f32; 4], upstream: [f32; 4]) -> [f32; 4] {
    let norm_sq: f32 = q.iter().map(|v| v * v).sum();
    let norm = norm_sq.sqrt().max(MIN_QUAT_NORM);
    let q_hat = q.map(|v| v / norm);
    let along: f32 = q_hat
        .iter()
        .zip(upstream.iter())
        .map(|(a, b)| a * b)
        .sum();
    [
        (upstream[0] - q_hat[0] * along) / norm,
        (upstream[1] - q_hat[1] * along) / norm,
        (upstream[2] - q_hat[2] * along) / norm,
        (upstream[3] - q_hat[3] * along) / norm,
    ]
}

/// d(sh0 * SH_C0 + 0.5)/d(sh0) applied to an upstream gradient.
pub fn d_sh0(upstream: Vec3) -> Vec3 {
    upstream * SH_C0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_inverse_roundtrip() {
        for x in [-4.0f32, -0.5, 0.0, 0.3, 6.0] {
            assert!((inverse_sigmoid(sigmoid(x)) - x).abs() < 1e-4);
        }
        assert_eq!(sigmoid(0.0), 0.5);
    }

    #[test]
    fn sh0_rgb_roundtrip() {
        let rgb = Vec3::new(0.1, 0.6, 0.9);
        let back = sh0_to_rgb(rgb_to_sh0(rgb));
        assert!((back - rgb).length() < 1e-6);
    }

    #[test]
    fn normalize_quat_unit_norm() {
        let q = normalize_quat([2.0, -1.0, 0.5, 3.0]);
        let norm: f32 = q.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        // Identity stays identity.
        assert_eq!(normalize_quat([1.0, 0.0, 0.0, 0.0]), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn quat_backward_matches_finite_difference() {
        let q = [0.8f32, -0.3, 0.2, 0.5];
        let upstream = [0.7f32, 0.1, -0.4, 0.2];
        let analytic = d_normalize_quat(q, upstream);

        let eps = 1e-3f32;
        for i in 0..4 {
            let mut lo = q;
            let mut hi = q;
            lo[i] -= eps;
            hi[i] += eps;
            let f = |q: [f32; 4]| -> f32 {
                normalize_quat(q)
                    .iter()
                    .zip(upstream.iter())
                    .map(|(a, b)| a * b)
                    .sum()
            };
            let numeric = (f(hi) - f(lo)) / (2.0 * eps);
            assert!(
                (numeric - analytic[i]).abs() < 1e-3,
                "component {i}: numeric {numeric} vs analytic {}",
                analytic[i]
            );
        }
    }

    #[test]
    fn exp_and_sigmoid_backward() {
        let g = d_exp(Vec3::splat(0.0), Vec3::splat(2.0));
        assert!((g - Vec3::splat(2.0)).length() < 1e-6);

        // sigmoid'(0) = 0.25
        assert!((d_sigmoid(0.0, 1.0) - 0.25).abs() < 1e-6);
    }
}
