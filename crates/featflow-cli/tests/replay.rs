use std::io::Write;
use std::path::Path;

use featflow_cli::output::PoseRecord;
use featflow_cli::{CliError, Replay, ReplayConfig};
use featflow_core::TrackerError;
use featflow_engine::EngineError;
use image::{GrayImage, Luma};

fn write_frames(dir: &Path, count: i32) {
    for index in 0..count {
        let image = GrayImage::from_fn(120, 96, |x, y| {
            let u = x as i32 - index;
            let inside = |x0: i32, y0: i32| (x0..x0 + 14).contains(&u) && (y0..y0 + 12).contains(&(y as i32));
            if inside(20, 20) || inside(60, 30) || inside(40, 60) || inside(85, 55) {
                Luma([210])
            } else {
                Luma([25])
            }
        });
        image.save(dir.join(format!("{index:04}.png"))).unwrap();
    }
}

fn write_imu(path: &Path, samples: usize) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "timestamp,gx,gy,gz,ax,ay,az").unwrap();
    for i in 0..samples {
        writeln!(file, "{},0.0,0.0,0.2,0.0,0.0,9.81", i as f64 * 0.01).unwrap();
    }
}

fn read_poses(path: &Path) -> Vec<PoseRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn replay_writes_one_pose_per_frame() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    write_frames(&frames, 4);
    let imu = dir.path().join("imu.csv");
    write_imu(&imu, 12);
    let out = dir.path().join("poses.jsonl");

    let config = ReplayConfig {
        frame_rate: 10.0,
        ..ReplayConfig::default()
    };
    let summary = Replay::new(config)
        .run(&frames, Some(&imu), std::fs::File::create(&out).unwrap())
        .unwrap();

    assert_eq!(summary.frames, 4);
    assert_eq!(summary.frames_tracked, 4);
    assert_eq!(summary.imu_samples, 12);
    assert!(summary.ids_issued > 0);
    assert!(summary.optimizer_rounds.is_none());

    let poses = read_poses(&out);
    let stamps: Vec<f64> = poses.iter().map(|p| p.timestamp).collect();
    assert_eq!(stamps, vec![0.0, 0.1, 0.2, 0.3]);
    // Gyro integration about z moves the attitude away from identity.
    assert!(poses[3].qz.abs() > 0.0);
}

#[test]
fn viz_adds_inertial_poses_and_optimizer_reports_rounds() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 2);
    let imu = dir.path().join("imu.csv");
    write_imu(&imu, 5);
    let out = dir.path().join("poses.jsonl");

    let mut config = ReplayConfig::default();
    config.frame_rate = 20.0;
    config.process.viz = true;
    config.optimizer = Some(featflow_engine::OptimizerConfig {
        period_ms: 1,
        iterations: 2,
    });
    let summary = Replay::new(config)
        .run(dir.path(), Some(&imu), std::fs::File::create(&out).unwrap())
        .unwrap();

    assert_eq!(read_poses(&out).len(), 2 + 5);
    assert!(summary.optimizer_rounds.is_some());
}

#[test]
fn empty_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = Replay::new(ReplayConfig::default()).run(dir.path(), None, Vec::new());
    assert!(matches!(result, Err(CliError::EmptySequence(_))));
}

#[test]
fn frame_size_change_fails_the_replay() {
    let dir = tempfile::tempdir().unwrap();
    for (index, (w, h)) in [(120, 96), (96, 120), (120, 96)].into_iter().enumerate() {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 13) % 200) as u8 + 20]))
            .save(dir.path().join(format!("{index:04}.png")))
            .unwrap();
    }
    let out = dir.path().join("poses.jsonl");

    let result = Replay::new(ReplayConfig::default()).run(
        dir.path(),
        None,
        std::fs::File::create(&out).unwrap(),
    );
    match result {
        Err(CliError::Engine(EngineError::Tracker(TrackerError::DimensionMismatch {
            expected,
            actual,
        }))) => {
            assert_eq!(expected, (120, 96));
            assert_eq!(actual, (96, 120));
        }
        other => panic!("expected a dimension mismatch, got {other:?}"),
    }
    // Only the first frame reached a publisher.
    assert_eq!(read_poses(&out).len(), 1);
}
