//! Reference backends for exercising the trainer without a GPU.
//!
//! [`MeanColorRasterizer`] is a deliberately trivial differentiable
//! renderer: every pixel gets the opacity-weighted mean splat color, so the
//! forward image is flat and the gradients for colors and opacities have a
//! closed form. Geometry receives zero gradient. Enough to drive the full
//! step contract in tests; not a splat renderer.

use glam::Vec3;
use image::{Rgb, Rgb32FImage};

use crate::{Rasterizer, RenderError, RenderGrads, RenderInputs, RenderOutput};

const WEIGHT_FLOOR: f32 = 1e-12;

#[derive(Debug, Default)]
pub struct MeanColorRasterizer;

impl MeanColorRasterizer {
    fn mean_color(inputs: &RenderInputs) -> (Vec3, f32) {
        let total: f32 = inputs.opacities.iter().sum::<f32>().max(WEIGHT_FLOOR);
        let mean = inputs
            .opacities
            .iter()
            .zip(inputs.colors)
            .map(|(&o, &c)| c * o)
            .sum::<Vec3>()
            / total;
        (mean, total)
    }
}

impl Rasterizer for MeanColorRasterizer {
    fn render(&mut self, inputs: &RenderInputs) -> Result<RenderOutput, RenderError> {
        inputs.validate()?;
        let (mean, total) = Self::mean_color(inputs);
        let (w, h) = (inputs.img_size.x, inputs.img_size.y);

        let image = Rgb32FImage::from_pixel(w, h, Rgb([mean.x, mean.y, mean.z]));
        let mean_alpha = (total / inputs.num_splats().max(1) as f32).clamp(0.0, 1.0);
        Ok(RenderOutput {
            image,
            alpha: vec![mean_alpha; (w * h) as usize],
        })
    }

    fn backward(
        &mut self,
        inputs: &RenderInputs,
        image_grad: &Rgb32FImage,
    ) -> Result<RenderGrads, RenderError> {
        inputs.validate()?;
        let (mean, total) = Self::mean_color(inputs);

        // Every pixel shows the same value, so the image gradient folds
        // into a single per-channel sum.
        let mut g = Vec3::ZERO;
        for px in image_grad.pixels() {
            g += Vec3::new(px[0], px[1], px[2]);
        }

        let mut grads = RenderGrads::zeros(inputs.num_splats());
        for i in 0..inputs.num_splats() {
            // pixel = sum_j o_j c_j / sum_j o_j
            let weight = inputs.opacities[i] / total;
            grads.colors[i] = g * weight;
            grads.opacities[i] = g.dot((inputs.colors[i] - mean) / total);
        }
        Ok(grads)
    }
}

/// A backend that always fails; for error-propagation tests.
#[derive(Debug, Default)]
pub struct FailingRasterizer;

impl Rasterizer for FailingRasterizer {
    fn render(&mut self, _inputs: &RenderInputs) -> Result<RenderOutput, RenderError> {
        Err(RenderError::Backend("backend unavailable".to_owned()))
    }

    fn backward(
        &mut self,
        _inputs: &RenderInputs,
        _image_grad: &Rgb32FImage,
    ) -> Result<RenderGrads, RenderError> {
        Err(RenderError::Backend("backend unavailable".to_owned()))
    }
}
