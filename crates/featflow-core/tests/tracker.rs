mod common;

use std::collections::{BTreeSet, HashMap, HashSet};

use common::{block_texture, blocks};
use featflow_core::TrackerError;
use featflow_core::track::{FeatureId, Tracker, TrackerConfig};
use image::{GrayImage, Luma};
use nalgebra::Vector2;

const W: u32 = 160;
const H: u32 = 120;

fn ids(tracker: &Tracker) -> BTreeSet<FeatureId> {
    tracker.features().iter().map(|f| f.id()).collect()
}

fn flat() -> GrayImage {
    GrayImage::from_pixel(W, H, Luma([30]))
}

#[test]
fn first_update_detects_and_initializes() {
    let config = TrackerConfig::default();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    assert!(!tracker.is_initialized());

    let stats = tracker.update(&blocks(W, H, 0, 0)).unwrap();
    let features = tracker.features();

    assert!(tracker.is_initialized());
    assert_eq!(tracker.frame_index(), 1);
    assert!(!features.is_empty());
    assert!(features.len() <= config.num_features_max);
    assert_eq!(stats.created, features.len());
    assert_eq!((stats.tracked, stats.dropped, stats.recovered), (0, 0, 0));
    assert!(stats.destroyed.is_empty());

    let expected: BTreeSet<FeatureId> = (1..=features.len() as u64).map(FeatureId).collect();
    assert_eq!(ids(&tracker), expected);
    for feature in features {
        assert_eq!(feature.age, 0);
        assert_eq!(feature.birth_frame, 0);
        assert!(feature.descriptor().is_some());
    }
    assert_eq!(tracker.mask().unwrap().as_image().dimensions(), (W - 16, H - 16));
}

#[test]
fn detections_respect_border_and_exclusion_boxes() {
    let config = TrackerConfig::default();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    tracker.update(&blocks(W, H, 0, 0)).unwrap();

    let margin = config.margin as f32;
    let half = (config.mask_size / 2) as i64;
    let features = tracker.features();
    let mask = tracker.mask().unwrap();

    for (i, a) in features.iter().enumerate() {
        let p = a.px_uv();
        assert!(p.x >= margin && p.y >= margin);
        assert!(p.x <= (W - config.margin - 1) as f32 && p.y <= (H - config.margin - 1) as f32);
        assert!(!mask.is_valid(p.x, p.y), "feature {} sits on an allowed pixel", a.id());

        for b in &features[i + 1..] {
            let q = b.px_uv();
            let dx = (p.x.round() as i64 - q.x.round() as i64).abs();
            let dy = (p.y.round() as i64 - q.y.round() as i64).abs();
            assert!(dx.max(dy) > half, "{} and {} overlap", a.id(), b.id());
        }
    }
}

#[test]
fn ids_are_never_reused() {
    let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
    let frames = [
        blocks(W, H, 0, 0),
        blocks(W, H, 1, 0),
        blocks(W, H, 2, 1),
        blocks(W, H, 30, 12),
        flat(),
        blocks(W, H, 0, 0),
        blocks(W, H, 0, 0),
    ];

    let mut destroyed: HashSet<FeatureId> = HashSet::new();
    let mut seen: BTreeSet<FeatureId> = BTreeSet::new();
    for frame in &frames {
        let stats = tracker.update(frame).unwrap();
        let current: Vec<FeatureId> = tracker.features().iter().map(|f| f.id()).collect();
        let unique: HashSet<FeatureId> = current.iter().copied().collect();
        assert_eq!(unique.len(), current.len(), "duplicate id in active set");

        let newest_before = seen.iter().next_back().copied();
        for id in &current {
            assert!(!destroyed.contains(id), "{id} came back after destruction");
            if !seen.contains(id) {
                assert!(newest_before.is_none_or(|n| *id > n));
            }
        }
        seen.extend(current);
        destroyed.extend(stats.destroyed);
    }
    assert_eq!(tracker.ids_issued(), seen.iter().next_back().map_or(0, |id| id.0));
}

#[test]
fn static_frames_keep_every_track_without_redetecting() {
    let config = TrackerConfig {
        num_features_min: 5,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config).unwrap();
    let image = blocks(W, H, 0, 0);
    tracker.update(&image).unwrap();
    let before = ids(&tracker);

    let stats = tracker.update(&image).unwrap();
    assert_eq!(stats.tracked, before.len());
    assert_eq!((stats.dropped, stats.created, stats.recovered), (0, 0, 0));
    assert_eq!(ids(&tracker), before);
    assert!(tracker.features().iter().all(|f| f.age == 1));
}

#[test]
fn replenishment_never_exceeds_ceiling() {
    let config = TrackerConfig {
        num_features_min: 30,
        num_features_max: 35,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config.clone()).unwrap();
    for shift in [0, 3, 6, 40, 0, 12] {
        let stats = tracker.update(&blocks(W, H, shift, shift / 3)).unwrap();
        assert!(tracker.features().len() <= config.num_features_max);
        assert!(stats.tracked + stats.created + stats.recovered <= config.num_features_max);
    }
}

#[test]
fn displacement_veto_drops_every_moving_track() {
    let config = TrackerConfig {
        max_pixel_displacement: 0.5,
        match_dropped_tracks: false,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config).unwrap();
    tracker.update(&blocks(W, H, 0, 0)).unwrap();
    let before = ids(&tracker);

    let stats = tracker.update(&blocks(W, H, 2, 1)).unwrap();
    assert_eq!(stats.tracked, 0);
    assert_eq!(stats.dropped, before.len());
    assert_eq!(stats.recovered, 0);
    assert!(ids(&tracker).is_disjoint(&before));
    assert_eq!(stats.destroyed.iter().copied().collect::<BTreeSet<_>>(), before);
    assert_eq!(tracker.dropped_len(), 0);
}

#[test]
fn dropped_tracks_are_recovered_by_descriptor() {
    let config = TrackerConfig {
        max_pixel_displacement: 0.5,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config).unwrap();
    tracker.update(&block_texture(W, H, 0, 0)).unwrap();
    let before: HashMap<FeatureId, Vector2<f32>> =
        tracker.features().iter().map(|f| (f.id(), f.px_uv())).collect();
    let newest = *before.keys().max().unwrap();

    let shift = Vector2::new(2.0, 1.0);
    let stats = tracker.update(&block_texture(W, H, 2, 1)).unwrap();
    assert_eq!(stats.dropped, before.len());
    assert!(stats.recovered * 2 > before.len());

    for feature in tracker.features() {
        if feature.recoveries > 0 {
            let old = before[&feature.id()];
            let error = (feature.px_uv() - (old + shift)).abs();
            assert!(
                error.x <= 3.0 && error.y <= 3.0,
                "{} recovered at {:?}, last seen at {:?}",
                feature.id(),
                feature.px_uv(),
                old
            );
            assert_eq!(feature.age, 0);
        } else {
            assert!(feature.id() > newest);
        }
    }
    let destroyed: BTreeSet<FeatureId> = stats.destroyed.iter().copied().collect();
    assert!(destroyed.is_disjoint(&ids(&tracker)));
    assert_eq!(destroyed.len() + stats.recovered, before.len());
}

#[test]
fn unmatched_detections_get_fresh_ids() {
    let config = TrackerConfig {
        max_pixel_displacement: 0.5,
        descriptor_distance_thresh: 0,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config).unwrap();
    tracker.update(&blocks(W, H, 0, 0)).unwrap();
    let before = ids(&tracker);

    let stats = tracker.update(&blocks(W, H, 2, 1)).unwrap();
    assert_eq!(stats.recovered, 0);
    assert!(stats.created > 0);
    assert!(ids(&tracker).is_disjoint(&before));
    assert_eq!(stats.destroyed.len(), before.len());
}

#[test]
fn tracks_leaving_the_frame_are_dropped() {
    let mut tracker = Tracker::new(TrackerConfig {
        match_dropped_tracks: false,
        ..TrackerConfig::default()
    })
    .unwrap();
    tracker.update(&blocks(W, H, 0, 0)).unwrap();
    assert!(tracker.features().iter().any(|f| f.px_uv().x > 145.0));
    let before = ids(&tracker);

    let stats = tracker.update(&blocks(W, H, 6, 0)).unwrap();
    assert!(stats.dropped > 0);
    assert_eq!(stats.tracked + stats.dropped, before.len());

    // LK keeps its whole integration window inside the image.
    let radius = 7.0;
    for feature in tracker.features() {
        if before.contains(&feature.id()) {
            assert!(feature.px_uv().x + radius <= (W - 1) as f32);
        }
    }
}

#[test]
fn pooled_tracks_survive_one_frame_with_ttl() {
    let config = TrackerConfig {
        dropped_track_ttl: 1,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config).unwrap();
    let image = blocks(W, H, 0, 0);
    tracker.update(&image).unwrap();
    let before = ids(&tracker);

    let lost = tracker.update(&flat()).unwrap();
    assert_eq!(lost.dropped, before.len());
    assert!(tracker.features().is_empty());
    assert!(lost.destroyed.is_empty());
    assert_eq!(tracker.dropped_len(), before.len());

    let back = tracker.update(&image).unwrap();
    assert_eq!(back.recovered, before.len());
    assert_eq!(back.created, 0);
    assert_eq!(ids(&tracker), before);
    assert!(back.destroyed.is_empty());
    assert_eq!(tracker.dropped_len(), 0);
}

#[test]
fn dimension_change_poisons_until_reset() {
    let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
    tracker.update(&blocks(W, H, 0, 0)).unwrap();
    let issued = tracker.ids_issued();

    let err = tracker.update(&blocks(H, W, 0, 0)).unwrap_err();
    assert_eq!(
        err,
        TrackerError::DimensionMismatch {
            expected: (W, H),
            actual: (H, W),
        }
    );
    assert!(tracker.is_poisoned());
    assert_eq!(
        tracker.update(&blocks(W, H, 0, 0)).unwrap_err(),
        TrackerError::Poisoned
    );

    tracker.reset();
    assert!(!tracker.is_initialized());
    let stats = tracker.update(&blocks(H, W, 0, 0)).unwrap();
    assert!(stats.created > 0);
    assert!(tracker.features().iter().all(|f| f.id().0 > issued));
}

#[test]
fn image_inside_margin_is_rejected() {
    let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
    let err = tracker.update(&GrayImage::new(16, 64)).unwrap_err();
    assert_eq!(
        err,
        TrackerError::ImageTooSmall {
            width: 16,
            height: 64,
            margin: 8,
        }
    );
    assert_eq!(tracker.update(&GrayImage::new(16, 64)).unwrap_err(), TrackerError::Poisoned);
    tracker.reset();
    assert!(tracker.update(&blocks(W, H, 0, 0)).is_ok());
}
