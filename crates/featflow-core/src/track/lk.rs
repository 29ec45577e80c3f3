use crate::img::image_utils::bilinear_sample_luma;
use crate::img::{Pyramid, PyramidLevel};
use crate::track::config::LkParams;
use crate::track::health::TrackOutcome;
use nalgebra::Vector2;
use tracing::{debug_span, trace};

/// Smallest structure-tensor eigenvalue, per window pixel, accepted as trackable.
const MIN_EIGENVALUE: f32 = 1e-3;

#[derive(Debug, Clone, Copy)]
pub struct TrackObservation {
    /// The position of the feature in the previous frame.
    pub initial_px_uv: Vector2<f32>,
    /// The refined position of the feature in the current frame.
    pub refined_px_uv: Vector2<f32>,
    /// Gauss-Newton iterations summed over all pyramid levels.
    pub iterations: u32,
    /// Root-mean-square photometric error at the finest level.
    pub residual: f32,
    pub outcome: TrackOutcome,
}

/// Pyramidal Lucas-Kanade point tracker.
#[derive(Debug, Clone)]
pub struct LKTracker {
    params: LkParams,
}

impl LKTracker {
    pub fn new(params: LkParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LkParams {
        &self.params
    }

    /// Tracks `initial_px_uv` from `prev` to `curr`, refining coarse-to-fine.
    ///
    /// A coarse level whose window leaves the image is skipped and its guess
    /// carried to the next finer level; failing at the finest level fails the track.
    pub fn track(&self, prev: &Pyramid, curr: &Pyramid, initial_px_uv: Vector2<f32>) -> TrackObservation {
        let _span = debug_span!("lk_track").entered();

        let depth = prev
            .levels()
            .len()
            .min(curr.levels().len())
            .min(self.params.max_level + 1);

        let top = &curr.levels()[depth - 1];
        let mut guess = initial_px_uv * top.scale;
        let mut iterations = 0u32;
        let mut residual = 0.0f32;

        for index in (0..depth).rev() {
            let prev_level = &prev.levels()[index];
            let curr_level = &curr.levels()[index];
            let template = initial_px_uv * prev_level.scale;

            let before = guess;
            match self.track_level(prev_level, curr_level, template, &mut guess) {
                Ok((iters, level_residual)) => {
                    iterations += iters;
                    residual = level_residual;
                }
                Err(outcome) if index == 0 => {
                    trace!(?outcome, "lk failed at finest level");
                    return TrackObservation {
                        initial_px_uv,
                        refined_px_uv: guess / curr_level.scale,
                        iterations,
                        residual,
                        outcome,
                    };
                }
                Err(_) => guess = before,
            }

            if index > 0 {
                let finer = &curr.levels()[index - 1];
                guess *= finer.scale / curr_level.scale;
            }
        }

        let base = curr.base();
        let refined_px_uv = guess / base.scale;
        let outcome = if point_within_bounds(
            refined_px_uv,
            base.image.width() as f32,
            base.image.height() as f32,
        ) {
            TrackOutcome::Converged
        } else {
            TrackOutcome::OutOfBounds
        };

        TrackObservation {
            initial_px_uv,
            refined_px_uv,
            iterations,
            residual,
            outcome,
        }
    }

    /// Refines `guess` on one level with forward-additive Lucas-Kanade.
    ///
    /// The template patch and its gradients are sampled once, so the 2×2
    /// Hessian is fixed for the level; each iteration only resamples the
    /// current image and solves `H * delta = -b`.
    ///
    /// Returns (iterations, residual) on success.
    fn track_level(
        &self,
        prev_level: &PyramidLevel,
        curr_level: &PyramidLevel,
        template_px_uv: Vector2<f32>,
        guess: &mut Vector2<f32>,
    ) -> Result<(u32, f32), TrackOutcome> {
        let radius = (self.params.win_size / 2) as f32;
        let r = radius as isize;
        let prev_dims = (prev_level.image.width() as f32, prev_level.image.height() as f32);
        let curr_dims = (curr_level.image.width() as f32, curr_level.image.height() as f32);

        if !window_within_bounds(template_px_uv, radius, prev_dims.0, prev_dims.1) {
            return Err(TrackOutcome::OutOfBounds);
        }
        if !window_within_bounds(*guess, radius, curr_dims.0, curr_dims.1) {
            return Err(TrackOutcome::OutOfBounds);
        }

        let side = (2 * r + 1) as usize;
        let mut patch = Vec::with_capacity(side * side);
        let mut hessian_xx = 0.0f32;
        let mut hessian_xy = 0.0f32;
        let mut hessian_yy = 0.0f32;

        for dy in -r..=r {
            for dx in -r..=r {
                let x = template_px_uv.x + dx as f32;
                let y = template_px_uv.y + dy as f32;
                let intensity = bilinear_sample_luma(&prev_level.image, x, y);
                let gx = bilinear_sample_luma(&prev_level.grad_x, x, y);
                let gy = bilinear_sample_luma(&prev_level.grad_y, x, y);
                hessian_xx += gx * gx;
                hessian_xy += gx * gy;
                hessian_yy += gy * gy;
                patch.push((Vector2::new(dx as f32, dy as f32), intensity, gx, gy));
            }
        }

        let samples = patch.len() as f32;
        let trace = hessian_xx + hessian_yy;
        let discriminant = ((hessian_xx - hessian_yy).powi(2) + 4.0 * hessian_xy * hessian_xy).sqrt();
        let min_eigenvalue = 0.5 * (trace - discriminant) / samples;
        if !(min_eigenvalue >= MIN_EIGENVALUE) {
            return Err(TrackOutcome::Diverged);
        }

        let determinant = hessian_xx * hessian_yy - hessian_xy * hessian_xy;
        let inv_det = 1.0 / determinant;
        let h_inv_00 = hessian_yy * inv_det;
        let h_inv_01 = -hessian_xy * inv_det;
        let h_inv_11 = hessian_xx * inv_det;

        let convergence_threshold_sq = self.params.eps * self.params.eps;
        let mut iterations = 0u32;
        let mut residual = 0.0f32;

        while (iterations as usize) < self.params.max_iter {
            iterations += 1;

            let mut steepest_x = 0.0f32;
            let mut steepest_y = 0.0f32;
            let mut error_sum_sq = 0.0f32;

            for (offset, template_intensity, gx, gy) in &patch {
                let target = *guess + offset;
                let error = bilinear_sample_luma(&curr_level.image, target.x, target.y)
                    - template_intensity;
                steepest_x += gx * error;
                steepest_y += gy * error;
                error_sum_sq += error * error;
            }
            residual = (error_sum_sq / samples).sqrt();

            let delta = Vector2::new(
                -(h_inv_00 * steepest_x + h_inv_01 * steepest_y),
                -(h_inv_01 * steepest_x + h_inv_11 * steepest_y),
            );
            if !delta.x.is_finite() || !delta.y.is_finite() {
                return Err(TrackOutcome::Diverged);
            }
            *guess += delta;

            if !window_within_bounds(*guess, radius, curr_dims.0, curr_dims.1) {
                return Err(TrackOutcome::OutOfBounds);
            }

            if delta.norm_squared() <= convergence_threshold_sq {
                break;
            }
        }

        Ok((iterations, residual))
    }
}

fn window_within_bounds(position: Vector2<f32>, radius: f32, width: f32, height: f32) -> bool {
    position.x - radius >= 0.0
        && position.y - radius >= 0.0
        && position.x + radius <= width - 1.0
        && position.y + radius <= height - 1.0
}

fn point_within_bounds(position: Vector2<f32>, width: f32, height: f32) -> bool {
    position.x >= 0.0 && position.y >= 0.0 && position.x <= width - 1.0 && position.y <= height - 1.0
}
