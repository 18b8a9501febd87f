mod depth;
mod error;
mod formats;
mod point_cloud;
mod projection;

pub use depth::{DepthEstimator, DepthMap, GrayDepthSource};
pub use error::{DatasetError, FormatError};
pub use formats::ply;
pub use point_cloud::PointCloud;
pub use projection::{DEPTH_RANGE_EPS, DEPTH_SCALE, DISPARITY_EPS, densify, project_to_cloud};

use image::{Rgb, Rgb32FImage, RgbImage};

/// Expand an 8-bit RGB image into the float [0, 1] buffer used as training
/// ground truth.
pub fn rgb8_to_f32(image: &RgbImage) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    let mut out = Rgb32FImage::new(w, h);
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        *dst = Rgb([
            src[0] as f32 / 255.0,
            src[1] as f32 / 255.0,
            src[2] as f32 / 255.0,
        ]);
    }
    out
}
