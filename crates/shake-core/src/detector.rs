//! Debounced shake detector
//!
//! Turns a stream of accelerometer samples into discrete charge ticks. A
//! sample counts as a shake when its magnitude is strictly above the
//! threshold; at most one shake per debounce window becomes a tick.

use embassy_time::{Duration, Instant};
use log::debug;

use crate::charge::ChargeState;
use crate::config::ShakeConfig;
use crate::sensors::AccelSample;

/// Outcome of an accepted sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeTick {
    /// Charge after the tick was applied
    pub percent: u8,
    /// This tick latched the full flag
    pub became_full: bool,
}

/// Threshold detector with a time-based debounce.
///
/// There is no magnitude hysteresis: a sustained shake produces ticks at
/// exactly the debounce rate.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    threshold: f32,
    tick_interval: Duration,
    increment: u8,
    /// Time of the last accepted tick
    last_tick: Option<Instant>,
}

impl ShakeDetector {
    pub fn new(config: &ShakeConfig) -> Self {
        Self {
            threshold: config.shake_threshold,
            tick_interval: config.tick_interval(),
            increment: config.increment_per_tick,
            last_tick: None,
        }
    }

    /// Forget the last accepted tick, so the next shake is accepted at once
    pub fn clear(&mut self) {
        self.last_tick = None;
    }

    pub fn last_tick(&self) -> Option<Instant> {
        self.last_tick
    }

    /// Feed one sample observed at `now`.
    ///
    /// Returns the tick if the sample was accepted. Rejected samples leave
    /// both the detector and `charge` untouched.
    pub fn on_sample(
        &mut self,
        sample: &AccelSample,
        now: Instant,
        charge: &mut ChargeState,
    ) -> Option<ChargeTick> {
        if !self.is_shake(sample) || !self.window_open(now) {
            return None;
        }

        self.last_tick = Some(now);
        let became_full = charge.apply_tick(self.increment);
        debug!(
            "Shake tick at {}ms: {}%{}",
            now.as_millis(),
            charge.percent,
            if became_full { " (full)" } else { "" }
        );

        Some(ChargeTick {
            percent: charge.percent,
            became_full,
        })
    }

    fn is_shake(&self, sample: &AccelSample) -> bool {
        sample.magnitude() > self.threshold
    }

    fn window_open(&self, now: Instant) -> bool {
        match self.last_tick {
            None => true,
            // A clock that went backwards keeps the window closed
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.tick_interval),
        }
    }
}
