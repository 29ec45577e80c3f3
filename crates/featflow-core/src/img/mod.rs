pub mod image_utils;
pub mod pyramid;

pub use image::GrayImage;
pub use image_utils::{bilinear_sample_clamped, bilinear_sample_luma};
pub use pyramid::{GradientImage, Pyramid, PyramidLevel, build_pyramid};
