//! The seam between the splat model and a differentiable rasterizer.
//!
//! Rendering and gradient computation run on an external accelerated
//! backend; this crate only pins down the data that crosses the boundary.
//! Backends implement [`Rasterizer`]: a synchronous forward pass producing
//! an image, and a backward pass turning a loss gradient on that image into
//! gradients with respect to the *activated* splat attributes. The chain
//! rule from activated back to raw attributes is the trainer's job.

pub mod testing;

use glam::{UVec2, Vec3};
use image::Rgb32FImage;
use thiserror::Error;

use scene::{ActivatedSplats, Camera};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("shape mismatch in render inputs: {0}")]
    ShapeMismatch(String),

    #[error("rasterizer backend failed: {0}")]
    Backend(String),
}

/// Borrowed activated attributes plus the camera, as handed to a backend.
///
/// Scales are strictly positive, rotations unit-norm w-x-y-z quaternions,
/// opacities in (0, 1) and colors in [0, 1]; producing them through
/// [`scene::Splats::activated`] guarantees all of that.
#[derive(Debug, Clone, Copy)]
pub struct RenderInputs<'a> {
    pub means: &'a [Vec3],
    pub scales: &'a [Vec3],
    pub rotations: &'a [[f32; 4]],
    pub opacities: &'a [f32],
    pub colors: &'a [Vec3],
    pub camera: &'a Camera,
    pub img_size: UVec2,
}

impl<'a> RenderInputs<'a> {
    pub fn from_activated(
        activated: &'a ActivatedSplats,
        camera: &'a Camera,
        img_size: UVec2,
    ) -> Self {
        Self {
            means: &activated.means,
            scales: &activated.scales,
            rotations: &activated.rotations,
            opacities: &activated.opacities,
            colors: &activated.colors,
            camera,
            img_size,
        }
    }

    pub fn num_splats(&self) -> usize {
        self.means.len()
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        let n = self.means.len();
        let check = |name: &str, got: usize| {
            if got == n {
                Ok(())
            } else {
                Err(RenderError::ShapeMismatch(format!(
                    "{name} has {got} entries, expected {n}"
                )))
            }
        };
        check("scales", self.scales.len())?;
        check("rotations", self.rotations.len())?;
        check("opacities", self.opacities.len())?;
        check("colors", self.colors.len())?;
        Ok(())
    }
}

/// Forward output: the rendered image and a per-pixel alpha map.
pub struct RenderOutput {
    pub image: Rgb32FImage,
    pub alpha: Vec<f32>,
}

/// Gradients with respect to the activated inputs, all of splat count
/// length.
#[derive(Debug, Clone)]
pub struct RenderGrads {
    pub means: Vec<Vec3>,
    pub scales: Vec<Vec3>,
    pub rotations: Vec<[f32; 4]>,
    pub opacities: Vec<f32>,
    pub colors: Vec<Vec3>,
}

impl RenderGrads {
    /// All-zero gradients for `n` splats.
    pub fn zeros(n: usize) -> Self {
        Self {
            means: vec![Vec3::ZERO; n],
            scales: vec![Vec3::ZERO; n],
            rotations: vec![[0.0; 4]; n],
            opacities: vec![0.0; n],
            colors: vec![Vec3::ZERO; n],
        }
    }
}

/// A differentiable splat renderer.
///
/// Both calls are blocking with no partial results; an error aborts the
/// caller's current step and is never retried here. Backends may keep
/// forward state between `render` and the matching `backward`, so calls
/// must be paired and sequential.
pub trait Rasterizer {
    fn render(&mut self, inputs: &RenderInputs) -> Result<RenderOutput, RenderError>;

    /// Backpropagate a loss gradient on the rendered image into the
    /// activated inputs.
    fn backward(
        &mut self,
        inputs: &RenderInputs,
        image_grad: &Rgb32FImage,
    ) -> Result<RenderGrads, RenderError>;
}
