use image::GrayImage;
use nalgebra::Vector3;

/// Seconds on the sensor clock.
pub type Timestamp = f64;

#[derive(Debug, Clone)]
pub struct VisualMeas {
    pub image: GrayImage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialMeas {
    /// Angular rate, rad/s.
    pub gyro: Vector3<f64>,
    /// Specific force, m/s².
    pub accel: Vector3<f64>,
}

/// Commands consumed by the process itself, never forwarded to the estimator as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Re-initialize the estimator and its tracker.
    Reset,
    Stop,
}

#[derive(Debug, Clone)]
pub enum MessageKind {
    Visual(VisualMeas),
    Inertial(InertialMeas),
    Control(ControlCommand),
}

#[derive(Debug, Clone)]
pub struct EstimatorMessage {
    pub ts: Timestamp,
    pub kind: MessageKind,
}

impl EstimatorMessage {
    pub fn visual(ts: Timestamp, image: GrayImage) -> Self {
        Self {
            ts,
            kind: MessageKind::Visual(VisualMeas { image }),
        }
    }

    pub fn inertial(ts: Timestamp, gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        Self {
            ts,
            kind: MessageKind::Inertial(InertialMeas { gyro, accel }),
        }
    }

    pub fn control(ts: Timestamp, command: ControlCommand) -> Self {
        Self {
            ts,
            kind: MessageKind::Control(command),
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            MessageKind::Visual(_) => "visual",
            MessageKind::Inertial(_) => "inertial",
            MessageKind::Control(ControlCommand::Reset) => "reset",
            MessageKind::Control(ControlCommand::Stop) => "stop",
        }
    }
}
