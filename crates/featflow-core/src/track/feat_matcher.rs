use crate::track::feat_descriptor::Descriptor;

/// Best train candidate found for one query descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Index of the train descriptor
    pub train_idx: usize,
    /// Hamming distance between the descriptors
    pub distance: u32,
}

/// Brute-force nearest-neighbour matcher over Hamming distance.
#[derive(Debug, Clone, Copy)]
pub struct HammingFeatMatcher {
    /// A match is accepted only when its distance is strictly below this bound.
    pub max_distance: u32,
}

impl HammingFeatMatcher {
    pub fn new(max_distance: u32) -> Self {
        Self { max_distance }
    }

    /// Returns the closest train descriptor, or `None` when nothing lies under
    /// `max_distance`. Train entries without a descriptor are skipped; on
    /// equal distances the earliest entry wins.
    pub fn best_match<'a, I>(&self, query: &Descriptor, train: I) -> Option<Match>
    where
        I: IntoIterator<Item = Option<&'a Descriptor>>,
    {
        let mut best: Option<Match> = None;
        for (train_idx, candidate) in train.into_iter().enumerate() {
            let Some(candidate) = candidate else {
                continue;
            };
            let distance = query.hamming(candidate);
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(Match {
                    train_idx,
                    distance,
                });
            }
        }
        best.filter(|m| m.distance < self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::feat_descriptor::DESCRIPTOR_BYTES;

    fn with_bits(count: usize) -> Descriptor {
        let mut bytes = [0u8; DESCRIPTOR_BYTES];
        for bit in 0..count {
            bytes[bit / 8] |= 1 << (bit % 8);
        }
        Descriptor(bytes)
    }

    #[test]
    fn picks_closest_under_threshold() {
        let matcher = HammingFeatMatcher::new(10);
        let query = with_bits(0);
        let train = [with_bits(8), with_bits(3), with_bits(5)];
        let m = matcher.best_match(&query, train.iter().map(Some)).unwrap();
        assert_eq!(m, Match { train_idx: 1, distance: 3 });
    }

    #[test]
    fn threshold_is_strict() {
        let matcher = HammingFeatMatcher::new(4);
        let query = with_bits(0);
        let train = [with_bits(4)];
        assert!(matcher.best_match(&query, train.iter().map(Some)).is_none());
    }

    #[test]
    fn first_entry_wins_exact_ties_and_missing_descriptors_are_skipped() {
        let matcher = HammingFeatMatcher::new(50);
        let query = with_bits(0);
        let a = with_bits(2);
        let b = with_bits(2);
        let m = matcher
            .best_match(&query, [None, Some(&a), Some(&b)])
            .unwrap();
        assert_eq!(m.train_idx, 1);
    }
}
