use std::fmt;

use nalgebra::Vector2;

use crate::track::feat_descriptor::Descriptor;

/// Persistent track identifier. Allocated once and never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic identifier source owned by the tracker.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> FeatureId {
        let id = FeatureId(self.next);
        self.next += 1;
        id
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A single 2-D track.
#[derive(Debug, Clone)]
pub struct Feature {
    id: FeatureId,
    px_uv: Vector2<f32>,
    descriptor: Option<Descriptor>,
    /// Frames survived since creation or the last recovery.
    pub age: u32,
    pub birth_frame: u64,
    pub last_seen_frame: u64,
    /// How many times this identity was recovered from the dropped pool.
    pub recoveries: u32,
}

impl Feature {
    pub(crate) fn new(
        id: FeatureId,
        px_uv: Vector2<f32>,
        descriptor: Option<Descriptor>,
        frame: u64,
    ) -> Self {
        Self {
            id,
            px_uv,
            descriptor,
            age: 0,
            birth_frame: frame,
            last_seen_frame: frame,
            recoveries: 0,
        }
    }

    pub fn id(&self) -> FeatureId {
        self.id
    }

    pub fn px_uv(&self) -> Vector2<f32> {
        self.px_uv
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    pub(crate) fn advance(&mut self, px_uv: Vector2<f32>, frame: u64) {
        self.px_uv = px_uv;
        self.age = self.age.saturating_add(1);
        self.last_seen_frame = frame;
    }

    pub(crate) fn set_descriptor(&mut self, descriptor: Option<Descriptor>) {
        self.descriptor = descriptor;
    }

    /// Moves a dropped feature onto a fresh detection, keeping its identity.
    pub(crate) fn recover(&mut self, px_uv: Vector2<f32>, descriptor: Descriptor, frame: u64) {
        self.px_uv = px_uv;
        self.descriptor = Some(descriptor);
        self.age = 0;
        self.last_seen_frame = frame;
        self.recoveries = self.recoveries.saturating_add(1);
    }
}

/// A feature waiting in the recovery pool.
#[derive(Debug, Clone)]
pub(crate) struct DroppedFeature {
    pub feature: Feature,
    pub dropped_frame: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_never_repeats() {
        let mut ids = IdAllocator::new();
        let a = ids.allocate();
        let b = ids.allocate();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn recovery_resets_age_and_counts() {
        let mut feature = Feature::new(FeatureId(7), Vector2::new(1.0, 2.0), None, 3);
        feature.advance(Vector2::new(2.0, 2.0), 4);
        assert_eq!(feature.age, 1);
        feature.recover(Vector2::new(5.0, 5.0), Descriptor([1; 32]), 6);
        assert_eq!(feature.id(), FeatureId(7));
        assert_eq!(feature.age, 0);
        assert_eq!(feature.recoveries, 1);
        assert_eq!(feature.last_seen_frame, 6);
        assert!(feature.descriptor().is_some());
    }
}
