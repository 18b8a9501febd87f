use std::path::Path;

use image::Rgb32FImage;

use render::Rasterizer;
use scene::{Camera, Splats};
use train::SplatTrainer;

use crate::error::PipelineError;

/// Run the caller-chosen number of optimization steps.
///
/// Strictly sequential; each step depends on the previous one's parameter
/// and moment state. A failing step is never retried: the error is
/// persisted as a record next to the artifacts (when `error_record_dir` is
/// given), the remaining iterations are abandoned, and no final artifact
/// should be produced by the caller.
pub fn optimize(
    splats: &mut Splats,
    trainer: &mut SplatTrainer,
    raster: &mut dyn Rasterizer,
    gt_image: &Rgb32FImage,
    camera: &Camera,
    iterations: u32,
    error_record_dir: Option<&Path>,
) -> Result<f32, PipelineError> {
    let mut last_loss = 0.0;
    for iter in 0..iterations {
        match trainer.step(splats, raster, gt_image, camera) {
            Ok(stats) => {
                last_loss = stats.loss;
                if iter % 10 == 0 {
                    log::info!("iter {iter:04}: loss {:.6}", stats.loss);
                }
            }
            Err(source) => {
                let err = PipelineError::Optimization { iter, source };
                if let Some(dir) = error_record_dir {
                    persist_error_record(dir, &err);
                }
                return Err(err);
            }
        }
    }
    Ok(last_loss)
}

fn persist_error_record(dir: &Path, err: &PipelineError) {
    let path = dir.join("error_log.txt");
    if let Err(io_err) = std::fs::write(&path, format!("{err}\n")) {
        log::warn!(
            "could not persist error record to {}: {io_err}",
            path.display()
        );
    }
}
