//! Live accelerometer readout for the demo screen

use core::fmt::Write;

use embassy_time::Duration;
use heapless::String;
use log::info;

use crate::config::{FAST_SAMPLE_INTERVAL_MS, SLOW_SAMPLE_INTERVAL_MS};
use crate::sensors::{AccelSample, MotionHub, MotionSubscription, SensorError};

/// Shows the latest x/y/z reading and lets the user pause it or change the
/// sampling speed.
///
/// Pausing removes *every* listener from the hub, not only this one.
pub struct MotionReadout<'h> {
    hub: &'h MotionHub,
    subscription: Option<MotionSubscription<'h>>,
    latest: AccelSample,
}

impl<'h> MotionReadout<'h> {
    /// Attach to `hub` at the fast interval
    pub fn new(hub: &'h MotionHub) -> Result<Self, SensorError> {
        let subscription = hub.subscribe()?;
        hub.set_update_interval(Duration::from_millis(FAST_SAMPLE_INTERVAL_MS));
        Ok(Self {
            hub,
            subscription: Some(subscription),
            latest: AccelSample::default(),
        })
    }

    pub fn is_on(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|subscription| !subscription.is_detached())
    }

    pub fn latest(&self) -> AccelSample {
        self.latest
    }

    /// Switch the readout off (removing all hub listeners) or back on.
    /// Returns whether it is on afterwards.
    pub fn toggle(&mut self) -> Result<bool, SensorError> {
        if self.is_on() {
            self.hub.remove_all_listeners();
            self.subscription = None;
            info!("Accelerometer readout off");
            Ok(false)
        } else {
            // Release a detached slot before taking a new one
            self.subscription = None;
            self.subscription = Some(self.hub.subscribe()?);
            info!("Accelerometer readout on");
            Ok(true)
        }
    }

    pub fn slow(&self) {
        self.hub
            .set_update_interval(Duration::from_millis(SLOW_SAMPLE_INTERVAL_MS));
    }

    pub fn fast(&self) {
        self.hub
            .set_update_interval(Duration::from_millis(FAST_SAMPLE_INTERVAL_MS));
    }

    /// Wait for the next reading. Returns `None` while the readout is off.
    pub async fn next(&mut self) -> Option<AccelSample> {
        let sample = self.subscription.as_mut()?.next().await?;
        self.latest = sample;
        Some(sample)
    }

    /// Pull in any queued readings. Returns true if the latest one changed.
    pub fn poll(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };
        let mut changed = false;
        while let Some(sample) = subscription.try_next() {
            changed |= sample != self.latest;
            self.latest = sample;
        }
        changed
    }

    /// `"x: 0.012"`, one line per axis
    pub fn axis_lines(&self) -> [String<16>; 3] {
        [
            format_axis('x', self.latest.x),
            format_axis('y', self.latest.y),
            format_axis('z', self.latest.z),
        ]
    }
}

fn format_axis(axis: char, value: f32) -> String<16> {
    let mut line = String::new();
    // Out-of-range values are truncated rather than dropped
    let _ = write!(line, "{}: {:.3}", axis, value);
    line
}
