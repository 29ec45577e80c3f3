use image::{
    Luma,
    imageops::{FilterType, resize},
};
use imageproc::{
    filter::gaussian_blur_f32,
    gradients::{horizontal_sobel, vertical_sobel},
    image::{GrayImage, ImageBuffer},
};

use log::{debug, trace};

/// Image gradients in intensity per pixel.
pub type GradientImage = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub octave: usize,
    pub scale: f32,
    pub image: GrayImage,
    pub grad_x: GradientImage,
    pub grad_y: GradientImage,
}

impl PyramidLevel {
    #[inline]
    pub fn intensity(&self, x: u32, y: u32) -> f32 {
        self.image.get_pixel(x, y).0[0] as f32
    }

    #[inline]
    pub fn gradient(&self, x: u32, y: u32) -> (f32, f32) {
        (
            self.grad_x.get_pixel(x, y).0[0],
            self.grad_y.get_pixel(x, y).0[0],
        )
    }
}

#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<PyramidLevel>,
}

impl Pyramid {
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    /// Full-resolution level. Every pyramid holds at least one level.
    pub fn base(&self) -> &PyramidLevel {
        &self.levels[0]
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.base().image.dimensions()
    }
}

/// Builds a Gaussian pyramid with `octaves` levels, halving each dimension per level.
/// Construction stops early once a level would fall below 2x2 pixels.
pub fn build_pyramid(base: &GrayImage, octaves: usize) -> Pyramid {
    let octaves = octaves.max(1);

    debug!(
        "Building pyramid with {} octaves from {}x{} image",
        octaves,
        base.width(),
        base.height()
    );

    let mut levels = Vec::with_capacity(octaves);
    let mut current = base.clone();

    for octave in 0..octaves {
        trace!("Processing octave {octave}");
        let blurred = gaussian_blur_f32(&current, 1.0);
        let grad_y = scale_gradient(vertical_sobel(&blurred), 0.125);
        let grad_x = scale_gradient(horizontal_sobel(&blurred), 0.125);
        let next = if octave + 1 != octaves {
            Some(resize(
                &blurred,
                blurred.width() / 2,
                blurred.height() / 2,
                FilterType::Triangle,
            ))
        } else {
            None
        };

        levels.push(PyramidLevel {
            octave,
            scale: 1.0 / 2f32.powi(octave as i32),
            image: blurred,
            grad_x,
            grad_y,
        });

        match next {
            Some(next) if next.width() >= 2 && next.height() >= 2 => current = next,
            _ => break,
        }
    }

    Pyramid { levels }
}

// Sobel responses are 8x the central difference; scaling keeps the LK normal
// equations in intensity-per-pixel units.
fn scale_gradient(sobel: ImageBuffer<Luma<i16>, Vec<i16>>, scale: f32) -> GradientImage {
    ImageBuffer::from_fn(sobel.width(), sobel.height(), |x, y| {
        Luma([sobel.get_pixel(x, y).0[0] as f32 * scale])
    })
}
