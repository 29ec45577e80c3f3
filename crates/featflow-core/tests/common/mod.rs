#![allow(dead_code)]

use image::{GrayImage, Luma};

/// Bright rectangles of varying size and brightness on a dark background,
/// translated by `(dx, dy)` pixels. Every rectangle corner is a FAST corner.
pub fn blocks(width: u32, height: u32, dx: i32, dy: i32) -> GrayImage {
    let mut squares = Vec::new();
    for j in 0..4i32 {
        for i in 0..5i32 {
            let x0 = 18 + 30 * i;
            let y0 = 16 + 26 * j;
            let w = 10 + 2 * ((i + 2 * j) % 3);
            let h = 12 + 2 * ((2 * i + j) % 2);
            let value = 140 + 22 * ((3 * i + j) % 5) as u8;
            squares.push((x0, y0, w, h, value));
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let u = x as i32 - dx;
        let v = y as i32 - dy;
        for &(x0, y0, w, h, value) in &squares {
            if u >= x0 && u < x0 + w && v >= y0 && v < y0 + h {
                return Luma([value]);
            }
        }
        Luma([30])
    })
}

/// 4 px blocks with hashed intensities, translated by `(dx, dy)` pixels.
/// No two corners share a neighbourhood, so descriptors are distinctive.
pub fn block_texture(width: u32, height: u32, dx: i32, dy: i32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let bx = (x as i32 - dx).div_euclid(4) as u32;
        let by = (y as i32 - dy).div_euclid(4) as u32;
        let mut h = bx.wrapping_mul(0x9E37_79B1) ^ by.wrapping_mul(0x85EB_CA77);
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        h ^= h >> 12;
        Luma([20 + (h % 12) as u8 * 18])
    })
}

/// Smooth multi-frequency texture translated by a sub-pixel offset.
pub fn smooth_texture(width: u32, height: u32, dx: f32, dy: f32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let u = x as f32 - dx;
        let v = y as f32 - dy;
        let value = 128.0
            + 50.0 * (0.15 * u + 0.3).sin()
            + 40.0 * (0.11 * v).cos()
            + 20.0 * (0.07 * (u + v)).sin()
            + 15.0 * (0.23 * u - 0.19 * v).cos();
        Luma([value.clamp(0.0, 255.0) as u8])
    })
}
