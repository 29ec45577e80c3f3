use nalgebra::Vector3;

/// One gyroscope + accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Seconds on the sensor clock
    pub timestamp: f64,
    /// Angular rate in rad/s
    pub gyro: Vector3<f64>,
    /// Specific force in m/s²
    pub accel: Vector3<f64>,
}

impl ImuSample {
    pub fn new(timestamp: f64, gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        Self {
            timestamp,
            gyro,
            accel,
        }
    }
}
