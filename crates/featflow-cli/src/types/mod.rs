pub mod config;
pub mod imu_sample;

pub use config::*;
pub use imu_sample::*;
