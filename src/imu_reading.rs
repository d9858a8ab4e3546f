use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single timestamped 6-axis IMU sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IMUReading {
    /// Sample time in seconds.
    pub timestamp: f64,
    /// Accelerometer reading, one value per axis.
    pub acc: Vector3<f64>,
    /// Gyroscope reading, one value per axis.
    pub gyro: Vector3<f64>,
}

impl IMUReading {
    pub fn new(timestamp: f64, acc: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self {
            timestamp,
            acc,
            gyro,
        }
    }
}
