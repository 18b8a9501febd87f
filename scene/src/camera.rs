use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

// Converts field of view to focal length
pub fn fov_to_focal(fov_rad: f64, pixels: u32) -> f64 {
    0.5 * (pixels as f64) / (fov_rad * 0.5).tan()
}

// Converts focal length to field of view
pub fn focal_to_fov(focal: f64, pixels: u32) -> f64 {
    2.0 * f64::atan((pixels as f64) / (2.0 * focal))
}

/// Pinhole intrinsics. Square pixels, principal point at the image center.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Intrinsics {
    /// Intrinsics for an image of the given size and horizontal field of view.
    ///
    /// `fov_degrees` must lie in (0, 180); values outside that range are a
    /// caller error and produce garbage focals rather than an Err.
    pub fn from_fov(width: u32, height: u32, fov_degrees: f32) -> Self {
        let focal = fov_to_focal((fov_degrees as f64).to_radians(), width) as f32;
        Self {
            fx: focal,
            fy: focal,
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
        }
    }

    /// The 3x3 K matrix form expected by rasterizer backends.
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_cols(
            Vec3::new(self.fx, 0.0, 0.0),
            Vec3::new(0.0, self.fy, 0.0),
            Vec3::new(self.cx, self.cy, 1.0),
        )
    }
}

/// A render camera: world-to-camera transform plus pinhole intrinsics.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub view: Mat4,
    pub intrinsics: Intrinsics,
}

impl Camera {
    /// Camera at the origin. Point clouds produced by back-projection already
    /// live in this camera's space, so world == camera.
    pub fn identity(intrinsics: Intrinsics) -> Self {
        Self {
            view: Mat4::IDENTITY,
            intrinsics,
        }
    }

    /// Camera on the +Z axis at `distance`, looking at the origin.
    pub fn looking_from_z(distance: f32, intrinsics: Intrinsics) -> Self {
        Self {
            view: Mat4::from_translation(Vec3::Z * distance),
            intrinsics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focal_fov_roundtrip() {
        let fov = 55.0f64.to_radians();
        let focal = fov_to_focal(fov, 640);
        assert!((focal_to_fov(focal, 640) - fov).abs() < 1e-12);
    }

    #[test]
    fn intrinsics_from_fov() {
        let k = Intrinsics::from_fov(640, 480, 90.0);
        // tan(45 deg) == 1, so f == w / 2.
        assert!((k.fx - 320.0).abs() < 1e-4);
        assert_eq!(k.fx, k.fy);
        assert_eq!(k.cx, 320.0);
        assert_eq!(k.cy, 240.0);
    }

    #[test]
    fn k_matrix_layout() {
        let k = Intrinsics::from_fov(100, 80, 60.0).matrix();
        assert_eq!(k.col(2).x, 50.0);
        assert_eq!(k.col(2).y, 40.0);
        assert_eq!(k.col(2).z, 1.0);
        assert_eq!(k.col(1).x, 0.0);
    }
}
