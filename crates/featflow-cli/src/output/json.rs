use std::io::Write;

use featflow_engine::{Pose, PosePublisher, PublishError, Timestamp};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// One line of the pose output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    /// Trace of the pose covariance
    pub covariance_trace: f64,
}

impl PoseRecord {
    pub fn new(ts: Timestamp, pose: &Pose, covariance: &DMatrix<f64>) -> Self {
        let q = pose.rotation.quaternion();
        Self {
            timestamp: ts,
            x: pose.translation.x,
            y: pose.translation.y,
            z: pose.translation.z,
            qw: q.w,
            qx: q.i,
            qy: q.j,
            qz: q.k,
            covariance_trace: covariance.trace(),
        }
    }
}

/// Writes every published pose as a JSON object on its own line.
pub struct JsonLinesPosePublisher<W: Write + Send> {
    writer: W,
    written: usize,
}

impl<W: Write + Send> JsonLinesPosePublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> PosePublisher for JsonLinesPosePublisher<W> {
    fn publish_pose(
        &mut self,
        ts: Timestamp,
        pose: &Pose,
        covariance: &DMatrix<f64>,
    ) -> Result<(), PublishError> {
        let record = PoseRecord::new(ts, pose, covariance);
        let line = serde_json::to_string(&record).map_err(|e| {
            log::warn!("Failed to serialize pose at {ts:.3}: {e}");
            PublishError::Disconnected
        })?;
        writeln!(self.writer, "{line}")
            .and_then(|_| self.writer.flush())
            .map_err(|e| {
                log::warn!("Failed to write pose at {ts:.3}: {e}");
                PublishError::Disconnected
            })?;
        self.written += 1;
        Ok(())
    }
}
