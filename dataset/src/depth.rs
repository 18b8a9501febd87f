use std::path::PathBuf;

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::error::DatasetError;

/// A per-pixel relative depth estimate, row-major, same spatial size as the
/// image it was computed from. Values are not calibrated: larger means
/// closer, as produced by monocular depth networks.
#[derive(Debug, Clone)]
pub struct DepthMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, DatasetError> {
        let expected = (width * height) as usize;
        if values.len() != expected {
            return Err(DatasetError::ShapeMismatch(format!(
                "depth map is {width}x{height} but holds {} values",
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    pub fn min_max(&self) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in &self.values {
            min = min.min(v);
            max = max.max(v);
        }
        (min, max)
    }

    /// Resample to a new resolution (bicubic).
    pub fn resized(&self, width: u32, height: u32) -> DepthMap {
        let buffer: image::ImageBuffer<image::Luma<f32>, Vec<f32>> =
            image::ImageBuffer::from_raw(self.width, self.height, self.values.clone())
                .expect("depth buffer length is validated at construction");
        let resized = imageops::resize(&buffer, width, height, FilterType::CatmullRom);
        DepthMap {
            width,
            height,
            values: resized.into_raw(),
        }
    }
}

/// The external monocular depth network contract.
///
/// Implementations own their model state; callers create one at startup,
/// pass it into the projection flow, and drop it on shutdown. There is no
/// process-global model cache.
pub trait DepthEstimator {
    fn estimate(&self, image: &RgbImage) -> Result<DepthMap, DatasetError>;
}

/// A file-backed estimator: reads a grayscale image and treats luma as
/// relative depth. Lets the pipeline run against depth maps precomputed by
/// an out-of-process network.
pub struct GrayDepthSource {
    path: PathBuf,
}

impl GrayDepthSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DepthEstimator for GrayDepthSource {
    fn estimate(&self, image: &RgbImage) -> Result<DepthMap, DatasetError> {
        let gray = image::open(&self.path)?.to_luma32f();
        let (dw, dh) = gray.dimensions();
        let depth = DepthMap::new(dw, dh, gray.into_raw())?;

        let (w, h) = image.dimensions();
        if (dw, dh) == (w, h) {
            Ok(depth)
        } else {
            // Depth networks run at their own internal resolution; resample
            // to the image grid like their postprocessing does.
            Ok(depth.resized(w, h))
        }
    }
}
