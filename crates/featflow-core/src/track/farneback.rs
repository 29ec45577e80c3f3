//! Farneback dense optical flow.
//!
//! Each image is approximated per pixel by a quadratic polynomial
//! `f(x) ≈ xᵀAx + bᵀx + c`, fitted by Gaussian-weighted least squares
//! (polynomial expansion). With the fits of both frames, a displacement `d`
//! satisfies `A·d = -½(b₂ - b₁)`; the normal equations are averaged over
//! a window and solved per pixel, coarse-to-fine, refining the previous
//! estimate on every iteration.

use image::imageops::{FilterType, resize};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::definitions::Image;
use imageproc::filter::{
    gaussian_blur_f32, horizontal_filter, separable_filter_equal, vertical_filter,
};
use log::{debug, trace};
use nalgebra::{Matrix6, Vector2, Vector6};

use crate::error::{Result, TrackerError};
use crate::img::bilinear_sample_clamped;
use crate::track::config::FarnebackParams;

/// Levels whose shorter side falls below this are skipped.
const MIN_LEVEL_SIZE: u32 = 16;
const SOLVE_REGULARIZATION: f32 = 1e-3;

/// Per-pixel displacement field, in pixels of the image it was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: usize,
    height: usize,
    data: Vec<Vector2<f32>>,
}

impl FlowField {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![Vector2::zeros(); width * height],
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn at(&self, x: usize, y: usize) -> Vector2<f32> {
        self.data[y * self.width + x]
    }

    fn set(&mut self, x: usize, y: usize, value: Vector2<f32>) {
        self.data[y * self.width + x] = value;
    }

    /// Bilinear sample with clamped coordinates.
    pub fn sample(&self, x: f32, y: f32) -> Vector2<f32> {
        if self.width == 0 || self.height == 0 {
            return Vector2::zeros();
        }
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
        let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Resamples onto a `width × height` grid, rescaling the vectors to match.
    fn rescaled(&self, width: usize, height: usize) -> FlowField {
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        let mut out = FlowField::zeros(width, height);
        for y in 0..height {
            for x in 0..width {
                let v = self.sample((x as f32 + 0.5) * sx - 0.5, (y as f32 + 0.5) * sy - 0.5);
                out.set(x, y, Vector2::new(v.x / sx, v.y / sy));
            }
        }
        out
    }
}

/// Dense scalar plane used for intermediate filtering.
type Plane = Image<Luma<f32>>;

#[inline]
fn value(plane: &Plane, x: u32, y: u32) -> f32 {
    plane.get_pixel(x, y).0[0]
}

fn to_plane(image: &GrayImage) -> Plane {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y).0[0] as f32])
    })
}

/// Quadratic fit per pixel: `A = [[a11, a12], [a12, a22]]`, `b = [b1, b2]`.
#[derive(Debug, Clone)]
struct PolyExpansion {
    a11: Plane,
    a12: Plane,
    a22: Plane,
    b1: Plane,
    b2: Plane,
}

#[derive(Debug, Clone)]
pub struct FarnebackFlow {
    params: FarnebackParams,
    applicability: Vec<f32>,
    applicability_x: Vec<f32>,
    applicability_xx: Vec<f32>,
    gram_inverse: Matrix6<f64>,
    window: Vec<f32>,
}

impl FarnebackFlow {
    pub fn new(params: FarnebackParams) -> Result<Self> {
        let n = (params.poly_n / 2).max(1) as isize;
        let sigma = params.poly_sigma as f64;
        let weights: Vec<f64> = (-n..=n)
            .map(|t| (-(t * t) as f64 / (2.0 * sigma * sigma)).exp())
            .collect();

        // Gram matrix of the basis [1, x, y, x², y², xy] under the separable applicability.
        let mut gram = Matrix6::<f64>::zeros();
        for (iy, wy) in weights.iter().enumerate() {
            for (ix, wx) in weights.iter().enumerate() {
                let x = ix as f64 - n as f64;
                let y = iy as f64 - n as f64;
                let basis = Vector6::new(1.0, x, y, x * x, y * y, x * y);
                gram += basis * basis.transpose() * (wx * wy);
            }
        }
        let gram_inverse = gram.try_inverse().ok_or_else(|| {
            TrackerError::InvalidConfig(format!(
                "farneback poly_n {} / poly_sigma {} gives a singular expansion",
                params.poly_n, params.poly_sigma
            ))
        })?;

        let applicability: Vec<f32> = weights.iter().map(|&w| w as f32).collect();
        let applicability_x = applicability
            .iter()
            .enumerate()
            .map(|(i, w)| w * (i as f32 - n as f32))
            .collect();
        let applicability_xx = applicability
            .iter()
            .enumerate()
            .map(|(i, w)| w * (i as f32 - n as f32).powi(2))
            .collect();

        let window = window_kernel(params.win_size, params.gaussian_window);

        Ok(Self {
            params,
            applicability,
            applicability_x,
            applicability_xx,
            gram_inverse,
            window,
        })
    }

    pub fn params(&self) -> &FarnebackParams {
        &self.params
    }

    /// Computes the flow from `prev` to `curr` into `flow`.
    ///
    /// When `use_initial_flow` is set and `flow` already covers the image, it
    /// seeds the coarsest level; otherwise the solve starts from zero.
    pub fn compute(&self, prev: &GrayImage, curr: &GrayImage, flow: &mut FlowField) {
        let (width, height) = (prev.width() as usize, prev.height() as usize);
        let seed = if self.params.use_initial_flow && flow.dimensions() == (width, height) {
            Some(flow.clone())
        } else {
            None
        };

        let mut scales: Vec<f32> = Vec::with_capacity(self.params.num_levels);
        for level in 0..self.params.num_levels.max(1) {
            let scale = self.params.pyr_scale.powi(level as i32);
            let w = (prev.width() as f32 * scale).round() as u32;
            let h = (prev.height() as f32 * scale).round() as u32;
            if level > 0 && w.min(h) < MIN_LEVEL_SIZE {
                break;
            }
            scales.push(scale);
        }

        let mut current: Option<FlowField> = None;
        for &scale in scales.iter().rev() {
            let prev_level = downscale(prev, scale);
            let curr_level = downscale(curr, scale);
            let (w, h) = (prev_level.width() as usize, prev_level.height() as usize);

            let mut level_flow = match (&current, &seed) {
                (Some(coarser), _) => coarser.rescaled(w, h),
                (None, Some(seed)) => seed.rescaled(w, h),
                (None, None) => FlowField::zeros(w, h),
            };

            let poly_prev = self.expand(&to_plane(&prev_level));
            let poly_curr = self.expand(&to_plane(&curr_level));
            for iteration in 0..self.params.num_iter {
                trace!("farneback level {w}x{h} iteration {iteration}");
                self.refine(&poly_prev, &poly_curr, &mut level_flow);
            }
            current = Some(level_flow);
        }

        if let Some(result) = current {
            *flow = if result.dimensions() == (width, height) {
                result
            } else {
                result.rescaled(width, height)
            };
        }
        debug!(
            "farneback flow over {}x{} with {} levels",
            width,
            height,
            scales.len()
        );
    }

    fn expand(&self, image: &Plane) -> PolyExpansion {
        let h0 = horizontal_filter(image, &self.applicability);
        let h1 = horizontal_filter(image, &self.applicability_x);
        let h2 = horizontal_filter(image, &self.applicability_xx);

        let c = [
            vertical_filter(&h0, &self.applicability),
            vertical_filter(&h1, &self.applicability),
            vertical_filter(&h0, &self.applicability_x),
            vertical_filter(&h2, &self.applicability),
            vertical_filter(&h0, &self.applicability_xx),
            vertical_filter(&h1, &self.applicability_x),
        ];

        let (w, h) = image.dimensions();
        let mut poly = PolyExpansion {
            a11: Plane::new(w, h),
            a12: Plane::new(w, h),
            a22: Plane::new(w, h),
            b1: Plane::new(w, h),
            b2: Plane::new(w, h),
        };
        let ginv = self.gram_inverse.cast::<f32>();
        for y in 0..h {
            for x in 0..w {
                let m = |i: usize| value(&c[i], x, y);
                let r = ginv * Vector6::new(m(0), m(1), m(2), m(3), m(4), m(5));
                poly.b1.put_pixel(x, y, Luma([r[1]]));
                poly.b2.put_pixel(x, y, Luma([r[2]]));
                poly.a11.put_pixel(x, y, Luma([r[3]]));
                poly.a22.put_pixel(x, y, Luma([r[4]]));
                poly.a12.put_pixel(x, y, Luma([r[5] * 0.5]));
            }
        }
        poly
    }

    fn refine(&self, prev: &PolyExpansion, curr: &PolyExpansion, flow: &mut FlowField) {
        let (w, h) = flow.dimensions();
        let mut g11 = Plane::new(w as u32, h as u32);
        let mut g12 = Plane::new(w as u32, h as u32);
        let mut g22 = Plane::new(w as u32, h as u32);
        let mut h1 = Plane::new(w as u32, h as u32);
        let mut h2 = Plane::new(w as u32, h as u32);

        for y in 0..h {
            for x in 0..w {
                let d = flow.at(x, y);
                let tx = x as f32 + d.x;
                let ty = y as f32 + d.y;
                let (px, py) = (x as u32, y as u32);

                let at = |plane: &Plane| bilinear_sample_clamped(plane, tx, ty);

                let a11 = 0.5 * (value(&prev.a11, px, py) + at(&curr.a11));
                let a12 = 0.5 * (value(&prev.a12, px, py) + at(&curr.a12));
                let a22 = 0.5 * (value(&prev.a22, px, py) + at(&curr.a22));

                let db1 = -0.5 * (at(&curr.b1) - value(&prev.b1, px, py)) + a11 * d.x + a12 * d.y;
                let db2 = -0.5 * (at(&curr.b2) - value(&prev.b2, px, py)) + a12 * d.x + a22 * d.y;

                g11.put_pixel(px, py, Luma([a11 * a11 + a12 * a12]));
                g12.put_pixel(px, py, Luma([a12 * (a11 + a22)]));
                g22.put_pixel(px, py, Luma([a12 * a12 + a22 * a22]));
                h1.put_pixel(px, py, Luma([a11 * db1 + a12 * db2]));
                h2.put_pixel(px, py, Luma([a12 * db1 + a22 * db2]));
            }
        }

        let g11 = separable_filter_equal(&g11, &self.window);
        let g12 = separable_filter_equal(&g12, &self.window);
        let g22 = separable_filter_equal(&g22, &self.window);
        let h1 = separable_filter_equal(&h1, &self.window);
        let h2 = separable_filter_equal(&h2, &self.window);

        for y in 0..h {
            for x in 0..w {
                let (px, py) = (x as u32, y as u32);
                let (a, b, c) = (value(&g11, px, py), value(&g12, px, py), value(&g22, px, py));
                let (r1, r2) = (value(&h1, px, py), value(&h2, px, py));
                let inv_det = 1.0 / (a * c - b * b + SOLVE_REGULARIZATION);
                let dx = (c * r1 - b * r2) * inv_det;
                let dy = (a * r2 - b * r1) * inv_det;
                if dx.is_finite() && dy.is_finite() {
                    flow.set(x, y, Vector2::new(dx, dy));
                }
            }
        }
    }
}

fn window_kernel(win_size: usize, gaussian: bool) -> Vec<f32> {
    let r = (win_size / 2) as isize;
    let raw: Vec<f32> = if gaussian {
        let sigma = (win_size as f32 * 0.3).max(0.5);
        (-r..=r)
            .map(|t| (-((t * t) as f32) / (2.0 * sigma * sigma)).exp())
            .collect()
    } else {
        vec![1.0; (2 * r + 1) as usize]
    };
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

fn downscale(image: &GrayImage, scale: f32) -> GrayImage {
    if scale >= 1.0 {
        return image.clone();
    }
    let sigma = (1.0 / scale - 1.0) * 0.5;
    let smoothed = gaussian_blur_f32(image, sigma.max(0.1));
    let w = ((image.width() as f32 * scale).round() as u32).max(1);
    let h = ((image.height() as f32 * scale).round() as u32).max(1);
    resize(&smoothed, w, h, FilterType::Triangle)
}
