//! Tunables for the shake detector and sampling policy

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Magnitude above which a sample counts as a shake (g-normalized, ≈1.0 at rest)
pub const SHAKE_THRESHOLD: f32 = 1.35;

/// Minimum time between two accepted charge ticks
pub const TICK_INTERVAL_MS: u64 = 200;

/// Percentage points added per accepted tick
pub const INCREMENT_PER_TICK: u8 = 1;

/// Nominal accelerometer interval used while charging and by the "fast" readout
pub const FAST_SAMPLE_INTERVAL_MS: u64 = 200;

/// Nominal accelerometer interval used by the "slow" readout
pub const SLOW_SAMPLE_INTERVAL_MS: u64 = 1000;

/// Charge seeded when the device cannot report its battery level
pub const FALLBACK_PERCENT: u8 = 25;

/// Largest encoded size of a [`ShakeConfig`] in postcard form
pub const CONFIG_MAX_ENCODED_LEN: usize = 32;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Shake threshold must be a positive, finite magnitude")]
    InvalidThreshold,
    #[error("Tick interval must be non-zero")]
    ZeroTickInterval,
    #[error("Increment per tick must be within 1..=100")]
    InvalidIncrement,
    #[error("Sample interval must be non-zero")]
    ZeroSampleInterval,
    #[error("Fallback percent must be within 0..=100")]
    InvalidFallback,
    #[error("Failed to decode configuration")]
    Decode,
    #[error("Failed to encode configuration")]
    Encode,
}

/// Detector and sampling configuration for a charge session
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ShakeConfig {
    pub shake_threshold: f32,
    pub tick_interval_ms: u64,
    pub increment_per_tick: u8,
    pub sample_interval_ms: u64,
    pub fallback_percent: u8,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            shake_threshold: SHAKE_THRESHOLD,
            tick_interval_ms: TICK_INTERVAL_MS,
            increment_per_tick: INCREMENT_PER_TICK,
            sample_interval_ms: FAST_SAMPLE_INTERVAL_MS,
            fallback_percent: FALLBACK_PERCENT,
        }
    }
}

impl ShakeConfig {
    /// Debounce window between accepted ticks
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Nominal interval requested from the motion hub
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.shake_threshold.is_finite() || self.shake_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.increment_per_tick == 0 || self.increment_per_tick > 100 {
            return Err(ConfigError::InvalidIncrement);
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroSampleInterval);
        }
        if self.fallback_percent > 100 {
            return Err(ConfigError::InvalidFallback);
        }
        Ok(())
    }

    /// Decode a postcard-encoded configuration and validate it
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|e| {
            log::error!("Config decode failed: {:?}", e);
            ConfigError::Decode
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Encode into `buf`, returning the used prefix
    pub fn to_slice<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|e| {
            log::error!("Config encode failed: {:?}", e);
            ConfigError::Encode
        })
    }
}
