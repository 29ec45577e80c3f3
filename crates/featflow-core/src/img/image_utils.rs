use image::{GenericImageView, Luma};

/// Bilinear sample of a single-channel image. Samples outside the image read as zero.
pub fn bilinear_sample_luma<T, I>(img: &I, x: f32, y: f32) -> f32
where
    I: GenericImageView<Pixel = Luma<T>>,
    T: Copy + Into<f32>,
{
    if x < 0.0 || y < 0.0 {
        return 0.0;
    }
    let w = img.width() as f32;
    let h = img.height() as f32;
    if x > w - 1.0 || y > h - 1.0 {
        return 0.0;
    }
    sample_unchecked(img, x, y)
}

/// Bilinear sample with coordinates clamped to the image, so border pixels repeat.
pub fn bilinear_sample_clamped<T, I>(img: &I, x: f32, y: f32) -> f32
where
    I: GenericImageView<Pixel = Luma<T>>,
    T: Copy + Into<f32>,
{
    if img.width() == 0 || img.height() == 0 {
        return 0.0;
    }
    let x = x.clamp(0.0, (img.width() - 1) as f32);
    let y = y.clamp(0.0, (img.height() - 1) as f32);
    sample_unchecked(img, x, y)
}

fn sample_unchecked<T, I>(img: &I, x: f32, y: f32) -> f32
where
    I: GenericImageView<Pixel = Luma<T>>,
    T: Copy + Into<f32>,
{
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);

    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0).0[0].into();
    let p10 = img.get_pixel(x1, y0).0[0].into();
    let p01 = img.get_pixel(x0, y1).0[0].into();
    let p11 = img.get_pixel(x1, y1).0[0].into();

    let top = p00 + dx * (p10 - p00);
    let bot = p01 + dx * (p11 - p01);
    top + dy * (bot - top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::GrayImage;

    #[test]
    fn midpoint_interpolates_neighbours() {
        let img = GrayImage::from_fn(4, 4, |x, _| Luma([(x * 10) as u8]));
        assert_relative_eq!(bilinear_sample_luma(&img, 1.5, 2.0), 15.0, epsilon = 1e-5);
    }

    #[test]
    fn outside_reads_zero_unless_clamped() {
        let img = GrayImage::from_pixel(4, 4, Luma([80]));
        assert_eq!(bilinear_sample_luma(&img, -0.5, 1.0), 0.0);
        assert_relative_eq!(bilinear_sample_clamped(&img, -3.0, 9.0), 80.0);
    }
}
