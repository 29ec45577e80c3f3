use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use image::RgbImage;
use nalgebra::DMatrix;
use thiserror::Error;

use crate::estimator::{FullState, MapSnapshot, Pose};
use crate::messages::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Publisher sink disconnected")]
    Disconnected,
    #[error("Publisher sink full")]
    Full,
}

pub trait CanvasPublisher: Send {
    fn publish_canvas(&mut self, ts: Timestamp, canvas: &RgbImage) -> Result<(), PublishError>;
}

pub trait PosePublisher: Send {
    fn publish_pose(
        &mut self,
        ts: Timestamp,
        pose: &Pose,
        covariance: &DMatrix<f64>,
    ) -> Result<(), PublishError>;
}

pub trait MapPublisher: Send {
    fn publish_map(&mut self, ts: Timestamp, map: &MapSnapshot) -> Result<(), PublishError>;
}

pub trait FullStatePublisher: Send {
    fn publish_full_state(&mut self, ts: Timestamp, state: &FullState) -> Result<(), PublishError>;
}

/// Everything a [`ChannelPublisher`] can forward.
#[derive(Debug, Clone)]
pub enum Output {
    Canvas {
        ts: Timestamp,
        canvas: RgbImage,
    },
    Pose {
        ts: Timestamp,
        pose: Pose,
        covariance: DMatrix<f64>,
    },
    Map {
        ts: Timestamp,
        map: MapSnapshot,
    },
    FullState {
        ts: Timestamp,
        state: FullState,
    },
}

impl Output {
    pub fn ts(&self) -> Timestamp {
        match self {
            Self::Canvas { ts, .. }
            | Self::Pose { ts, .. }
            | Self::Map { ts, .. }
            | Self::FullState { ts, .. } => *ts,
        }
    }
}

/// Forwards outputs over a bounded channel without blocking.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: Sender<Output>,
}

impl ChannelPublisher {
    pub fn new(sender: Sender<Output>) -> Self {
        Self { sender }
    }

    fn forward(&self, output: Output) -> Result<(), PublishError> {
        self.sender.try_send(output).map_err(|err| match err {
            TrySendError::Full(_) => PublishError::Full,
            TrySendError::Disconnected(_) => PublishError::Disconnected,
        })
    }
}

/// A publisher and the receiving end of its channel.
pub fn channel_publisher(capacity: usize) -> (ChannelPublisher, Receiver<Output>) {
    let (sender, receiver) = bounded(capacity);
    (ChannelPublisher::new(sender), receiver)
}

impl CanvasPublisher for ChannelPublisher {
    fn publish_canvas(&mut self, ts: Timestamp, canvas: &RgbImage) -> Result<(), PublishError> {
        self.forward(Output::Canvas {
            ts,
            canvas: canvas.clone(),
        })
    }
}

impl PosePublisher for ChannelPublisher {
    fn publish_pose(
        &mut self,
        ts: Timestamp,
        pose: &Pose,
        covariance: &DMatrix<f64>,
    ) -> Result<(), PublishError> {
        self.forward(Output::Pose {
            ts,
            pose: *pose,
            covariance: covariance.clone(),
        })
    }
}

impl MapPublisher for ChannelPublisher {
    fn publish_map(&mut self, ts: Timestamp, map: &MapSnapshot) -> Result<(), PublishError> {
        self.forward(Output::Map {
            ts,
            map: map.clone(),
        })
    }
}

impl FullStatePublisher for ChannelPublisher {
    fn publish_full_state(&mut self, ts: Timestamp, state: &FullState) -> Result<(), PublishError> {
        self.forward(Output::FullState {
            ts,
            state: state.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_and_disconnected_channels_map_to_errors() {
        let (mut publisher, receiver) = channel_publisher(1);
        let map = MapSnapshot::default();
        assert_eq!(publisher.publish_map(0.0, &map), Ok(()));
        assert_eq!(publisher.publish_map(0.1, &map), Err(PublishError::Full));
        assert_eq!(receiver.recv().map(|o| o.ts()), Ok(0.0));
        drop(receiver);
        assert_eq!(publisher.publish_map(0.2, &map), Err(PublishError::Disconnected));
    }
}
