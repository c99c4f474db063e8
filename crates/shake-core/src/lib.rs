//! Hardware-independent core library for shake-charge
//!
//! This crate contains all platform-agnostic logic for the shake-to-charge
//! demo: accelerometer sample types and the motion hub that fans samples out
//! to listeners, the battery source abstraction, the debounced shake detector,
//! the charge session that ties them together, and the small models behind
//! the two demo screens.
//!
//! It is `#![no_std]` so it compiles on both embedded targets and desktop
//! hosts (for the simulator and tests).

#![no_std]

pub mod battery;
pub mod charge;
pub mod config;
pub mod detector;
pub mod readout;
pub mod screen;
pub mod sensors;
pub mod session;

pub use battery::{BatteryError, BatterySource, BatteryState, BatteryStatus};
pub use charge::{ChargePhase, ChargeState, FillBand};
pub use config::{ConfigError, ShakeConfig};
pub use detector::{ChargeTick, ShakeDetector};
pub use screen::ScreenMode;
pub use sensors::{AccelSample, MotionHub, MotionSensor, SensorError};
pub use session::{ActiveSession, ChargeSession, SessionError};
