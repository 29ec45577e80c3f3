use super::FeatureSeed;

/// Greedy radius suppression over seeds already sorted by descending score.
pub fn radius_nms(mut seeds: Vec<FeatureSeed>, radius: f32, max_keep: usize) -> Vec<FeatureSeed> {
    let r2 = radius * radius;
    let mut kept: Vec<FeatureSeed> = Vec::with_capacity(seeds.len().min(max_keep));
    'outer: for s in seeds.drain(..) {
        if kept.len() == max_keep {
            break;
        }
        for k in &kept {
            if (s.px_uv - k.px_uv).norm_squared() <= r2 {
                continue 'outer;
            }
        }
        kept.push(s);
    }
    kept
}
