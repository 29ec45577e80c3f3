mod common;

use common::smooth_texture;
use featflow_core::track::seed::ShiTomasiGridConfig;
use featflow_core::track::{DetectorConfig, FarnebackParams, OpticalFlowConfig, Tracker, TrackerConfig};
use nalgebra::Vector2;

fn dense_config() -> TrackerConfig {
    TrackerConfig {
        optical_flow: OpticalFlowConfig::Farneback(FarnebackParams {
            num_levels: 2,
            num_iter: 4,
            win_size: 11,
            gaussian_window: true,
            ..FarnebackParams::default()
        }),
        detector: DetectorConfig::ShiTomasi(ShiTomasiGridConfig {
            response_threshold: 1.0,
            per_cell_cap: 2,
            ..ShiTomasiGridConfig::default()
        }),
        num_features_min: 10,
        num_features_max: 40,
        margin: 12,
        ..TrackerConfig::default()
    }
}

#[test]
fn dense_backend_translates_features_with_the_flow() {
    let shift = Vector2::new(1.0f32, 0.5);
    let mut tracker = Tracker::new(dense_config()).unwrap();
    tracker.update(&smooth_texture(128, 96, 0.0, 0.0)).unwrap();
    let before: Vec<(u64, Vector2<f32>)> = tracker
        .features()
        .iter()
        .map(|f| (f.id().0, f.px_uv()))
        .collect();
    assert!(before.len() >= 10);

    let stats = tracker.update(&smooth_texture(128, 96, shift.x, shift.y)).unwrap();
    assert_eq!(stats.tracked + stats.dropped, before.len());
    assert!(stats.tracked > 0);

    let mut errors: Vec<f32> = tracker
        .features()
        .iter()
        .filter_map(|f| {
            let &(_, old) = before.iter().find(|(id, _)| *id == f.id().0)?;
            Some((f.px_uv() - old - shift).norm())
        })
        .collect();
    errors.sort_by(|a, b| a.total_cmp(b));
    let median = errors[errors.len() / 2];
    assert!(median < 0.5, "median flow error {median}");
}

#[test]
fn dense_backend_ignores_displacement_limit_by_default() {
    let mut config = dense_config();
    config.max_pixel_displacement = 0.1;
    let mut tracker = Tracker::new(config.clone()).unwrap();
    tracker.update(&smooth_texture(128, 96, 0.0, 0.0)).unwrap();
    let stats = tracker.update(&smooth_texture(128, 96, 1.0, 0.5)).unwrap();
    assert!(stats.tracked > 0);

    config.dense_displacement_veto = true;
    let mut vetoing = Tracker::new(config).unwrap();
    let first = vetoing.update(&smooth_texture(128, 96, 0.0, 0.0)).unwrap();
    let stats = vetoing.update(&smooth_texture(128, 96, 1.0, 0.5)).unwrap();
    assert!(stats.dropped > first.created / 2);
}

#[test]
fn initial_flow_is_reused_across_frames() {
    let mut config = dense_config();
    if let OpticalFlowConfig::Farneback(params) = &mut config.optical_flow {
        params.use_initial_flow = true;
    }
    let mut tracker = Tracker::new(config).unwrap();
    for step in 0..4 {
        let offset = step as f32 * 0.75;
        let stats = tracker.update(&smooth_texture(128, 96, offset, 0.0)).unwrap();
        if step > 0 {
            assert!(stats.tracked > 0, "frame {step} lost every track");
        }
    }
}
