use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, warn};

use crate::error::EngineError;
use crate::estimator::Estimator;
use crate::messages::{ControlCommand, EstimatorMessage, MessageKind, Timestamp};
use crate::publisher::{
    CanvasPublisher, FullStatePublisher, MapPublisher, PosePublisher, PublishError,
};
use crate::queue::MessageQueue;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Publish canvases, and poses on inertial messages.
    pub viz: bool,
    pub max_pts_to_publish: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            viz: false,
            max_pts_to_publish: 200,
        }
    }
}

/// Optional output sinks; any subset may be registered.
#[derive(Default)]
pub struct Publishers {
    pub canvas: Option<Box<dyn CanvasPublisher>>,
    pub pose: Option<Box<dyn PosePublisher>>,
    pub map: Option<Box<dyn MapPublisher>>,
    pub full_state: Option<Box<dyn FullStatePublisher>>,
}

/// What the loop should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub failed: usize,
    pub stopped: bool,
}

/// Single-threaded consumer that runs messages against an estimator and
/// routes its outputs to the registered publishers.
pub struct EstimatorProcess<E: Estimator> {
    estimator: E,
    config: ProcessConfig,
    publishers: Publishers,
    halted: bool,
}

impl<E: Estimator> EstimatorProcess<E> {
    pub fn new(estimator: E, config: ProcessConfig) -> Self {
        Self {
            estimator,
            config,
            publishers: Publishers::default(),
            halted: false,
        }
    }

    pub fn with_publishers(mut self, publishers: Publishers) -> Self {
        self.publishers = publishers;
        self
    }

    pub fn set_canvas_publisher(&mut self, publisher: impl CanvasPublisher + 'static) {
        self.publishers.canvas = Some(Box::new(publisher));
    }

    pub fn set_pose_publisher(&mut self, publisher: impl PosePublisher + 'static) {
        self.publishers.pose = Some(Box::new(publisher));
    }

    pub fn set_map_publisher(&mut self, publisher: impl MapPublisher + 'static) {
        self.publishers.map = Some(Box::new(publisher));
    }

    pub fn set_full_state_publisher(&mut self, publisher: impl FullStatePublisher + 'static) {
        self.publishers.full_state = Some(Box::new(publisher));
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        &mut self.estimator
    }

    pub fn into_estimator(self) -> E {
        self.estimator
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn handle(&mut self, message: EstimatorMessage) -> Result<Flow, EngineError> {
        let ts = message.ts;
        let _span = debug_span!("handle", ts, kind = message.label()).entered();

        match message.kind {
            MessageKind::Control(ControlCommand::Reset) => {
                self.estimator.reset();
                if self.halted {
                    info!(ts, "estimator reset, resuming");
                }
                self.halted = false;
                Ok(Flow::Continue)
            }
            MessageKind::Control(ControlCommand::Stop) => {
                debug!(ts, "stop requested");
                Ok(Flow::Stop)
            }
            MessageKind::Visual(meas) => {
                if self.halted {
                    return Err(EngineError::Halted);
                }
                if let Err(err) = self.estimator.visual_meas(ts, &meas.image) {
                    if matches!(err, EngineError::Tracker(_)) {
                        warn!(ts, %err, "frame rejected, halting until reset");
                        self.halted = true;
                    }
                    return Err(err);
                }
                self.publish_visual(ts);
                Ok(Flow::Continue)
            }
            MessageKind::Inertial(meas) => {
                self.estimator.inertial_meas(ts, meas.gyro, meas.accel);
                if self.config.viz {
                    if let Some(publisher) = self.publishers.pose.as_mut() {
                        let pose = self.estimator.pose();
                        let covariance = self.estimator.pose_covariance();
                        report("pose", ts, publisher.publish_pose(ts, &pose, &covariance));
                    }
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn publish_visual(&mut self, ts: Timestamp) {
        if self.config.viz {
            if let (Some(publisher), Some(canvas)) =
                (self.publishers.canvas.as_mut(), self.estimator.canvas())
            {
                report("canvas", ts, publisher.publish_canvas(ts, canvas));
            }
        }
        if let Some(publisher) = self.publishers.pose.as_mut() {
            let pose = self.estimator.pose();
            let covariance = self.estimator.pose_covariance();
            report("pose", ts, publisher.publish_pose(ts, &pose, &covariance));
        }
        if let Some(publisher) = self.publishers.map.as_mut() {
            let mut map = self.estimator.instate_landmarks(self.config.max_pts_to_publish);
            map.truncate(self.config.max_pts_to_publish);
            report("map", ts, publisher.publish_map(ts, &map));
        }
        if let Some(publisher) = self.publishers.full_state.as_mut() {
            let state = self.estimator.full_state();
            report("full_state", ts, publisher.publish_full_state(ts, &state));
        }
    }

    /// Handles every queued message in timestamp order. Failures are logged
    /// and counted; a stop command ends the drain early.
    pub fn drain(&mut self, queue: &mut MessageQueue) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(message) = queue.pop() {
            let ts = message.ts;
            match self.handle(message) {
                Ok(Flow::Continue) => report.processed += 1,
                Ok(Flow::Stop) => {
                    report.processed += 1;
                    report.stopped = true;
                    break;
                }
                Err(err) => {
                    warn!(ts, %err, "message failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

fn report(channel: &'static str, ts: Timestamp, result: Result<(), PublishError>) {
    if let Err(err) = result {
        warn!(channel, ts, %err, "publish failed");
    }
}

/// What a dispatch worker hands back on join.
pub struct WorkerExit<E: Estimator> {
    pub process: EstimatorProcess<E>,
    /// First frame contract violation the worker hit. Kept even when a later
    /// reset resumed the process.
    pub halt: Option<EngineError>,
    /// Messages that failed, the halting one included.
    pub failed: usize,
}

/// Handle to a worker started by [`spawn_process`].
pub struct ProcessWorker<E: Estimator> {
    handle: JoinHandle<WorkerExit<E>>,
    halted: Arc<AtomicBool>,
}

impl<E: Estimator> ProcessWorker<E> {
    /// Whether the process is currently rejecting frames. Producers should
    /// stop sending visual messages until they send a reset.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn join(self) -> Result<WorkerExit<E>, EngineError> {
        self.handle.join().map_err(|_| EngineError::WorkerPanicked)
    }
}

/// Runs `process` on a worker thread fed by `receiver`.
///
/// Each wake moves every pending message into a timestamp heap and handles
/// the earliest one. The worker exits on a stop command, or once the channel
/// disconnects and the heap is empty.
pub fn spawn_process<E>(
    mut process: EstimatorProcess<E>,
    receiver: Receiver<EstimatorMessage>,
) -> ProcessWorker<E>
where
    E: Estimator + Send + 'static,
{
    let halted = Arc::new(AtomicBool::new(process.is_halted()));
    let flag = Arc::clone(&halted);
    let handle = thread::spawn(move || {
        let mut queue = MessageQueue::new();
        let mut halt = None;
        let mut failed = 0;
        loop {
            if queue.is_empty() {
                match receiver.recv() {
                    Ok(message) => queue.push(message),
                    Err(_) => {
                        debug!("message channel closed");
                        break;
                    }
                }
            }
            queue.extend(receiver.try_iter());

            let Some(message) = queue.pop() else {
                continue;
            };
            let ts = message.ts;
            let result = process.handle(message);
            flag.store(process.is_halted(), Ordering::Release);
            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(err) => {
                    failed += 1;
                    if halt.is_none() && matches!(err, EngineError::Tracker(_)) {
                        halt = Some(err);
                    } else {
                        warn!(ts, %err, "message failed");
                    }
                }
            }
        }
        WorkerExit {
            process,
            halt,
            failed,
        }
    });
    ProcessWorker { handle, halted }
}
