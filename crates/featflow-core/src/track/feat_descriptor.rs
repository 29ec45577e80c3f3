use std::fmt;

use nalgebra::Vector2;

use crate::img::PyramidLevel;

pub const DESCRIPTOR_BYTES: usize = 32;

/// 256-bit binary appearance signature of a keypoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}

pub trait FeatDescriptorExtractor {
    fn describe(&self, level: &PyramidLevel, px_uv: Vector2<f32>) -> Descriptor;
}

pub mod orb;
pub use orb::OrbDescriptor;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_counts_differing_bits() {
        let a = Descriptor([0u8; DESCRIPTOR_BYTES]);
        let mut bits = [0u8; DESCRIPTOR_BYTES];
        bits[0] = 0b1011;
        bits[31] = 0xff;
        let b = Descriptor(bits);
        assert_eq!(a.hamming(&b), 11);
        assert_eq!(b.hamming(&b), 0);
    }
}
