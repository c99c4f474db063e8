mod motion;

pub use motion::*;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: read failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("Motion hub has no free listener slots")]
    ListenerLimit,
}

/// One 3-axis accelerometer reading.
///
/// Units are whatever the sensor emits; the detector only assumes the
/// magnitude is ≈1.0 when the device is at rest under gravity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccelSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AccelSample {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the three axes
    pub fn magnitude(&self) -> f32 {
        libm::sqrtf(self.x * self.x + self.y * self.y + self.z * self.z)
    }
}

/// Trait for accelerometer drivers.
pub trait MotionSensor {
    /// Take one reading from the device.
    fn read(&mut self) -> impl Future<Output = Result<AccelSample, SensorError>>;
}

/// Read one sample from `sensor` and fan it out through `hub`.
///
/// The caller paces calls with [`MotionHub::update_interval`].
pub async fn pump_once<S: MotionSensor>(
    sensor: &mut S,
    hub: &MotionHub,
) -> Result<AccelSample, SensorError> {
    let sample = sensor.read().await.map_err(|e| {
        log::warn!("Accelerometer read failed: {}", e);
        e
    })?;
    hub.publish(sample);
    Ok(sample)
}
