use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::bounded;
use featflow_engine::{
    EngineError, EstimatorMessage, EstimatorProcess, FrontendEstimator, NullOptimizer,
    OptimizerWorker, spawn_process,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{CliError, Result};
use crate::imu::ImuParser;
use crate::output::JsonLinesPosePublisher;
use crate::sequence::ImageSequence;
use crate::types::{ImuSample, ReplayConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub frames: usize,
    /// Frames the tracker accepted.
    pub frames_tracked: u64,
    pub imu_samples: usize,
    pub active_features: usize,
    pub ids_issued: u64,
    pub optimizer_rounds: Option<usize>,
    pub elapsed_ms: f64,
}

/// Replays a recorded image sequence (and optional IMU log) through the
/// dispatch worker, writing every published pose as a JSON line.
pub struct Replay {
    config: ReplayConfig,
}

impl Replay {
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    pub fn run<W>(&self, images: &Path, imu: Option<&Path>, poses: W) -> Result<ReplaySummary>
    where
        W: Write + Send + 'static,
    {
        let start = Instant::now();
        let mut sequence = ImageSequence::open(images, self.config.frame_rate)?;
        if let Some(max) = self.config.max_frames {
            sequence.truncate(max);
        }
        let imu_samples = match imu {
            Some(path) => ImuParser::parse_file(path)?,
            None => Vec::new(),
        };
        info!(
            frames = sequence.len(),
            imu = imu_samples.len(),
            "starting replay of {}",
            images.display()
        );

        let estimator =
            FrontendEstimator::new(self.config.tracker.clone(), self.config.estimator)?;
        let mut process = EstimatorProcess::new(estimator, self.config.process);
        process.set_pose_publisher(JsonLinesPosePublisher::new(poses));

        let optimizer = self.config.optimizer.map(|config| {
            let shared = Arc::new(Mutex::new(NullOptimizer::default()));
            let worker = OptimizerWorker::spawn(Arc::clone(&shared), config);
            (shared, worker)
        });

        let (sender, receiver) = bounded(self.config.channel_capacity);
        let worker = spawn_process(process, receiver);

        let fed = feed(&sequence, &imu_samples, |message| {
            if worker.is_halted() {
                return Err(CliError::Engine(EngineError::Halted));
            }
            sender
                .send(message)
                .map_err(|_| CliError::Engine(EngineError::Disconnected))
        });
        drop(sender);

        let exit = worker.join()?;
        let optimizer_rounds = optimizer.map(|(shared, worker)| {
            worker.stop();
            shared.lock().calls
        });
        if let Some(err) = exit.halt {
            warn!(%err, "replay stopped after a frame contract violation");
            return Err(CliError::Engine(err));
        }
        fed?;

        let tracker = exit.process.estimator().tracker();
        let summary = ReplaySummary {
            frames: sequence.len(),
            frames_tracked: tracker.frame_index(),
            imu_samples: imu_samples.len(),
            active_features: tracker.features().len(),
            ids_issued: tracker.ids_issued(),
            optimizer_rounds,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            frames = summary.frames,
            tracked = summary.frames_tracked,
            features = summary.active_features,
            ids = summary.ids_issued,
            "replay complete in {:.1}ms",
            summary.elapsed_ms
        );
        Ok(summary)
    }
}

/// Sends frames and IMU samples merged by timestamp.
fn feed<F>(sequence: &ImageSequence, imu: &[ImuSample], mut send: F) -> Result<()>
where
    F: FnMut(EstimatorMessage) -> Result<()>,
{
    let mut next_imu = 0;
    for index in 0..sequence.len() {
        let ts = sequence.timestamp(index);
        while next_imu < imu.len() && imu[next_imu].timestamp <= ts {
            let sample = &imu[next_imu];
            send(EstimatorMessage::inertial(sample.timestamp, sample.gyro, sample.accel))?;
            next_imu += 1;
        }
        let image = sequence.load(index)?;
        debug!(index, ts, "frame queued");
        send(EstimatorMessage::visual(ts, image))?;
    }
    for sample in &imu[next_imu..] {
        send(EstimatorMessage::inertial(sample.timestamp, sample.gyro, sample.accel))?;
    }
    Ok(())
}
