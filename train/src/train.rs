use glam::{UVec2, Vec3};
use hashbrown::HashMap;
use image::Rgb32FImage;
use thiserror::Error;
use tracing::trace_span;

use render::{Rasterizer, RenderGrads, RenderInputs};
use scene::activation::{d_exp, d_normalize_quat, d_sh0, d_sigmoid};
use scene::{Camera, Splats};

use crate::adam::AdamState;
use crate::config::TrainConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamGroup {
    Means,
    LogScales,
    Rotations,
    Opacities,
    Sh0,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("rasterizer failed: {0}")]
    Render(#[from] render::RenderError),

    #[error("ground truth is {gt_w}x{gt_h} but the backend rendered {img_w}x{img_h}")]
    ShapeMismatch {
        gt_w: u32,
        gt_h: u32,
        img_w: u32,
        img_h: u32,
    },

    #[error("backend returned {got} {name} gradients for {expected} splats")]
    GradientShape {
        name: &'static str,
        got: usize,
        expected: usize,
    },
}

/// Result of one optimization step.
#[derive(Debug)]
pub struct StepStats {
    /// Mean absolute per-pixel, per-channel error against the ground truth.
    pub loss: f32,
    pub rendered: Rgb32FImage,
}

/// Drives render -> loss -> gradient -> update cycles over a [`Splats`]
/// store.
///
/// Owns the per-group Adam moments, so steps must run sequentially: step
/// i+1 depends on the moment state left by step i. There is no internal
/// convergence check; callers pick the iteration count.
pub struct SplatTrainer {
    config: TrainConfig,
    states: HashMap<ParamGroup, AdamState>,
    color_only: bool,
}

impl SplatTrainer {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            color_only: false,
        }
    }

    /// Freeze everything but the SH0 colors, e.g. when geometry comes from
    /// a mesh and must stay put. Frozen groups receive no updates and their
    /// Adam moments stop advancing.
    pub fn switch_to_color_only(&mut self, lr: f64) {
        self.color_only = true;
        self.config.lr_coeffs_dc = lr;
    }

    fn active(&self, group: ParamGroup) -> bool {
        !self.color_only || group == ParamGroup::Sh0
    }

    /// One render -> L1 loss -> backward -> Adam cycle.
    ///
    /// On error (backend failure, shape mismatch) the call aborts before
    /// any parameter writes and may simply be retried or abandoned by the
    /// caller; moments only advance on success.
    pub fn step(
        &mut self,
        splats: &mut Splats,
        raster: &mut dyn Rasterizer,
        gt_image: &Rgb32FImage,
        camera: &Camera,
    ) -> Result<StepStats, TrainError> {
        let (gt_w, gt_h) = gt_image.dimensions();

        let activated = splats.activated();
        let inputs = RenderInputs::from_activated(&activated, camera, UVec2::new(gt_w, gt_h));

        let output = trace_span!("Forward pass").in_scope(|| raster.render(&inputs))?;
        let (img_w, img_h) = output.image.dimensions();
        if (img_w, img_h) != (gt_w, gt_h) {
            return Err(TrainError::ShapeMismatch {
                gt_w,
                gt_h,
                img_w,
                img_h,
            });
        }

        // L1 loss and its image gradient in one pass. d|x|/dx is the sign,
        // zero at zero, scaled by the mean reduction.
        let num_values = (gt_w * gt_h * 3) as f32;
        let mut loss = 0.0f32;
        let mut image_grad = Rgb32FImage::new(gt_w, gt_h);
        for ((pred, gt), grad) in output
            .image
            .pixels()
            .zip(gt_image.pixels())
            .zip(image_grad.pixels_mut())
        {
            for c in 0..3 {
                let diff = pred[c] - gt[c];
                loss += diff.abs();
                let sign = if diff > 0.0 {
                    1.0
                } else if diff < 0.0 {
                    -1.0
                } else {
                    0.0
                };
                grad[c] = sign / num_values;
            }
        }
        loss /= num_values;

        let grads =
            trace_span!("Backward pass").in_scope(|| raster.backward(&inputs, &image_grad))?;
        self.check_grads(&grads, splats.num_splats())?;

        trace_span!("Optimizer step").in_scope(|| self.apply(splats, &grads));

        Ok(StepStats {
            loss,
            rendered: output.image,
        })
    }

    fn check_grads(&self, grads: &RenderGrads, expected: usize) -> Result<(), TrainError> {
        let check = |name: &'static str, got: usize| {
            if got == expected {
                Ok(())
            } else {
                Err(TrainError::GradientShape {
                    name,
                    got,
                    expected,
                })
            }
        };
        check("mean", grads.means.len())?;
        check("scale", grads.scales.len())?;
        check("rotation", grads.rotations.len())?;
        check("opacity", grads.opacities.len())?;
        check("color", grads.colors.len())?;
        Ok(())
    }

    /// Chain the activated-attribute gradients through the activations into
    /// the raw store and take one Adam step per active group.
    fn apply(&mut self, splats: &mut Splats, grads: &RenderGrads) {
        let adam = self.config.adam;
        let (lr_mean, lr_scale, lr_rotation, lr_opac, lr_coeffs_dc) = (
            self.config.lr_mean,
            self.config.lr_scale,
            self.config.lr_rotation,
            self.config.lr_opac,
            self.config.lr_coeffs_dc,
        );

        if self.active(ParamGroup::Means) {
            // Positions are stored raw; the chain rule is the identity.
            let flat: &[f32] = bytemuck::cast_slice(&grads.means);
            let params: &mut [f32] = bytemuck::cast_slice_mut(splats.means_mut());
            Self::group_state(&mut self.states, ParamGroup::Means, params.len())
                .update(&adam, lr_mean, params, flat);
        }

        if self.active(ParamGroup::LogScales) {
            let raw: Vec<Vec3> = splats
                .log_scales()
                .iter()
                .zip(&grads.scales)
                .map(|(&x, &g)| d_exp(x, g))
                .collect();
            let params: &mut [f32] = bytemuck::cast_slice_mut(splats.log_scales_mut());
            Self::group_state(&mut self.states, ParamGroup::LogScales, params.len()).update(
                &adam,
                lr_scale,
                params,
                bytemuck::cast_slice(&raw),
            );
        }

        if self.active(ParamGroup::Rotations) {
            let raw: Vec<[f32; 4]> = splats
                .rotations()
                .iter()
                .zip(&grads.rotations)
                .map(|(&q, &g)| d_normalize_quat(q, g))
                .collect();
            let params: &mut [f32] = bytemuck::cast_slice_mut(splats.rotations_mut());
            Self::group_state(&mut self.states, ParamGroup::Rotations, params.len()).update(
                &adam,
                lr_rotation,
                params,
                bytemuck::cast_slice(&raw),
            );
        }

        if self.active(ParamGroup::Opacities) {
            let raw: Vec<f32> = splats
                .raw_opacities()
                .iter()
                .zip(&grads.opacities)
                .map(|(&x, &g)| d_sigmoid(x, g))
                .collect();
            let params = splats.raw_opacities_mut();
            Self::group_state(&mut self.states, ParamGroup::Opacities, params.len())
                .update(&adam, lr_opac, params, &raw);
        }

        if self.active(ParamGroup::Sh0) {
            let raw: Vec<Vec3> = grads.colors.iter().map(|&g| d_sh0(g)).collect();
            let params: &mut [f32] = bytemuck::cast_slice_mut(splats.sh0_mut());
            Self::group_state(&mut self.states, ParamGroup::Sh0, params.len()).update(
                &adam,
                lr_coeffs_dc,
                params,
                bytemuck::cast_slice(&raw),
            );
        }
    }

    fn group_state(
        states: &mut HashMap<ParamGroup, AdamState>,
        group: ParamGroup,
        len: usize,
    ) -> &mut AdamState {
        states.entry(group).or_insert_with(|| AdamState::new(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use render::testing::{FailingRasterizer, MeanColorRasterizer};
    use render::{RenderError, RenderOutput};
    use scene::Intrinsics;

    fn flat_gt(w: u32, h: u32, value: f32) -> Rgb32FImage {
        Rgb32FImage::from_pixel(w, h, Rgb([value, value, value]))
    }

    fn camera() -> Camera {
        Camera::identity(Intrinsics::from_fov(4, 4, 55.0))
    }

    fn gray_splats(n: usize, value: f32) -> Splats {
        let points: Vec<Vec3> = (0..n).map(|i| Vec3::splat(i as f32)).collect();
        let colors = vec![Vec3::splat(value); n];
        Splats::from_point_cloud(&points, &colors).unwrap()
    }

    #[test]
    fn loss_zero_on_matching_render() {
        let mut splats = gray_splats(5, 0.6);
        let mut trainer = SplatTrainer::new(TrainConfig::default());
        let stats = trainer
            .step(
                &mut splats,
                &mut MeanColorRasterizer,
                &flat_gt(4, 4, 0.6),
                &camera(),
            )
            .unwrap();
        assert!(stats.loss.abs() < 1e-5);
    }

    #[test]
    fn loss_one_on_opposite_images() {
        // All-black splats against an all-white ground truth.
        let mut splats = gray_splats(5, 0.0);
        let mut trainer = SplatTrainer::new(TrainConfig::default());
        let stats = trainer
            .step(
                &mut splats,
                &mut MeanColorRasterizer,
                &flat_gt(4, 4, 1.0),
                &camera(),
            )
            .unwrap();
        assert!((stats.loss - 1.0).abs() < 1e-5);
    }

    #[test]
    fn steps_reduce_loss() {
        let mut splats = gray_splats(4, 0.2);
        let mut trainer = SplatTrainer::new(TrainConfig::default());
        trainer.switch_to_color_only(0.02);

        let gt = flat_gt(4, 4, 0.8);
        let mut raster = MeanColorRasterizer;
        let first = trainer
            .step(&mut splats, &mut raster, &gt, &camera())
            .unwrap()
            .loss;
        let mut last = first;
        for _ in 0..200 {
            last = trainer
                .step(&mut splats, &mut raster, &gt, &camera())
                .unwrap()
                .loss;
        }
        assert!(last < first * 0.5, "loss {first} -> {last}");
    }

    #[test]
    fn color_only_mode_freezes_geometry_exactly() {
        let points = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        // Distinct colors so color gradients are nonzero.
        let colors = vec![Vec3::new(0.1, 0.2, 0.3), Vec3::splat(0.9), Vec3::splat(0.4)];
        let mut splats = Splats::from_point_cloud(&points, &colors).unwrap();

        let mut trainer = SplatTrainer::new(TrainConfig::default());
        let gt = flat_gt(4, 4, 1.0);
        let mut raster = MeanColorRasterizer;

        // One unrestricted step so every group has moved off init.
        trainer
            .step(&mut splats, &mut raster, &gt, &camera())
            .unwrap();

        trainer.switch_to_color_only(0.02);
        let means_before = splats.means().to_vec();
        let scales_before = splats.log_scales().to_vec();
        let rots_before = splats.rotations().to_vec();
        let opac_before = splats.raw_opacities().to_vec();
        let sh0_before = splats.sh0().to_vec();

        for _ in 0..5 {
            trainer
                .step(&mut splats, &mut raster, &gt, &camera())
                .unwrap();
        }

        assert_eq!(splats.means(), &means_before[..]);
        assert_eq!(splats.log_scales(), &scales_before[..]);
        assert_eq!(splats.rotations(), &rots_before[..]);
        assert_eq!(splats.raw_opacities(), &opac_before[..]);
        assert_ne!(splats.sh0(), &sh0_before[..]);
    }

    #[test]
    fn rasterizer_error_propagates() {
        let mut splats = gray_splats(2, 0.5);
        let mut trainer = SplatTrainer::new(TrainConfig::default());
        let before = splats.raw_opacities().to_vec();

        let err = trainer
            .step(
                &mut splats,
                &mut FailingRasterizer,
                &flat_gt(4, 4, 0.5),
                &camera(),
            )
            .unwrap_err();
        assert!(matches!(err, TrainError::Render(_)));
        // Nothing was written.
        assert_eq!(splats.raw_opacities(), &before[..]);
    }

    /// A backend that ignores the requested size, to exercise the shape
    /// guard.
    struct WrongSizeRasterizer;

    impl Rasterizer for WrongSizeRasterizer {
        fn render(&mut self, _inputs: &RenderInputs) -> Result<RenderOutput, RenderError> {
            Ok(RenderOutput {
                image: Rgb32FImage::new(2, 2),
                alpha: vec![0.0; 4],
            })
        }

        fn backward(
            &mut self,
            inputs: &RenderInputs,
            _image_grad: &Rgb32FImage,
        ) -> Result<RenderGrads, RenderError> {
            Ok(RenderGrads::zeros(inputs.num_splats()))
        }
    }

    #[test]
    fn mismatched_render_size_rejected() {
        let mut splats = gray_splats(2, 0.5);
        let mut trainer = SplatTrainer::new(TrainConfig::default());
        let err = trainer
            .step(
                &mut splats,
                &mut WrongSizeRasterizer,
                &flat_gt(4, 4, 0.5),
                &camera(),
            )
            .unwrap_err();
        assert!(matches!(err, TrainError::ShapeMismatch { .. }));
    }
}
