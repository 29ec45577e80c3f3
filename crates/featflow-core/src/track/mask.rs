use image::{GrayImage, Luma};

pub const ALLOWED: u8 = 255;
pub const FORBIDDEN: u8 = 0;

/// Binary exclusion map over the interior of an image.
///
/// The buffer covers `(width - 2·margin) × (height - 2·margin)` pixels.
/// Every operation takes full-image coordinates and subtracts the margin
/// itself, so callers never deal with the interior offset.
#[derive(Debug, Clone)]
pub struct Mask {
    pixels: GrayImage,
    margin: u32,
    image_width: u32,
    image_height: u32,
}

impl Mask {
    /// Returns `None` when the margin leaves no interior.
    pub fn new(image_width: u32, image_height: u32, margin: u32) -> Option<Self> {
        let width = image_width.checked_sub(2 * margin).filter(|w| *w > 0)?;
        let height = image_height.checked_sub(2 * margin).filter(|h| *h > 0)?;
        Some(Self {
            pixels: GrayImage::from_pixel(width, height, Luma([ALLOWED])),
            margin,
            image_width,
            image_height,
        })
    }

    pub fn margin(&self) -> u32 {
        self.margin
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn reset(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            pixel.0[0] = ALLOWED;
        }
    }

    /// Forbids the `size × size` box centred on the rounded `(x, y)`, clipped to the mask.
    pub fn mask_out(&mut self, x: f32, y: f32, size: u32) {
        let half = (size / 2) as i64;
        let cx = x.round() as i64 - self.margin as i64;
        let cy = y.round() as i64 - self.margin as i64;
        let (width, height) = (self.pixels.width() as i64, self.pixels.height() as i64);

        let x0 = (cx - half).max(0);
        let x1 = (cx + half).min(width - 1);
        let y0 = (cy - half).max(0);
        let y1 = (cy + half).min(height - 1);
        if x0 > x1 || y0 > y1 {
            return;
        }
        for my in y0..=y1 {
            for mx in x0..=x1 {
                self.pixels.put_pixel(mx as u32, my as u32, Luma([FORBIDDEN]));
            }
        }
    }

    /// True iff `(x, y)` is at least `margin` pixels from every image edge
    /// and its mask pixel is allowed.
    pub fn is_valid(&self, x: f32, y: f32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let margin = self.margin as f32;
        if x < margin
            || y < margin
            || x > (self.image_width - self.margin) as f32 - 1.0
            || y > (self.image_height - self.margin) as f32 - 1.0
        {
            return false;
        }
        let mx = (x.round() - margin) as i64;
        let my = (y.round() - margin) as i64;
        if mx < 0 || my < 0 || mx >= self.pixels.width() as i64 || my >= self.pixels.height() as i64 {
            return false;
        }
        self.pixels.get_pixel(mx as u32, my as u32).0[0] == ALLOWED
    }
}
