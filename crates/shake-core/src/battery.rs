//! Battery source abstraction and the battery status panel model

use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};
use heapless::String;
use log::{debug, warn};
use thiserror_no_std::Error;

/// Channel capacity for battery events
pub const BATTERY_EVENT_CAPACITY: usize = 4;

/// Number of battery event listeners (the status panel)
pub const BATTERY_EVENT_SUBSCRIBERS: usize = 2;

/// Number of battery event publishers (the platform battery driver)
pub const BATTERY_EVENT_PUBLISHERS: usize = 1;

/// Live battery notifications, as pushed by the platform
pub type BatteryEvents = PubSubChannel<
    CriticalSectionRawMutex,
    BatteryEvent,
    BATTERY_EVENT_CAPACITY,
    BATTERY_EVENT_SUBSCRIBERS,
    BATTERY_EVENT_PUBLISHERS,
>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryError {
    #[error("Battery level is not reported on this device")]
    Unavailable,
    #[error("Battery {operation} failed: {details}")]
    ReadFailed {
        operation: &'static str,
        details: &'static str,
    },
    #[error("Battery reported a level outside 0..=1")]
    InvalidLevel,
}

/// Charging state as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryState {
    #[default]
    Unknown,
    /// Running on battery
    Unplugged,
    Charging,
    Full,
}

impl BatteryState {
    /// Get the display label for this state
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unplugged => "not charging",
            Self::Charging => "charging",
            Self::Full => "full",
        }
    }
}

/// Events delivered on [`BatteryEvents`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatteryEvent {
    /// New level as a fraction in [0, 1]
    LevelChanged(f32),
    StateChanged(BatteryState),
}

/// Trait for platform battery readers.
pub trait BatterySource {
    /// One-shot read of the current level as a fraction in [0, 1].
    fn level(&mut self) -> impl Future<Output = Result<f32, BatteryError>>;

    /// One-shot read of the charging state.
    fn power_state(&mut self) -> impl Future<Output = Result<BatteryState, BatteryError>>;
}

/// Convert a level fraction into a whole percentage, rounding half up.
pub fn level_to_percent(level: f32) -> Result<u8, BatteryError> {
    if !level.is_finite() {
        return Err(BatteryError::InvalidLevel);
    }
    let percent = libm::floorf(level * 100.0 + 0.5).clamp(0.0, 100.0);
    Ok(percent as u8)
}

/// Read the battery and convert to a percentage in one step
pub async fn read_percent<B: BatterySource>(battery: &mut B) -> Result<u8, BatteryError> {
    let level = battery.level().await?;
    level_to_percent(level)
}

/// Battery panel on the demo screen: level and charging text.
///
/// Starts with an unknown level (`"..."`) and unknown state until the first
/// successful read or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryStatus {
    pub percent: Option<u8>,
    pub state: BatteryState,
}

impl BatteryStatus {
    pub const fn new() -> Self {
        Self {
            percent: None,
            state: BatteryState::Unknown,
        }
    }

    /// Read level then charging state. A failed read leaves its field as is.
    pub async fn refresh<B: BatterySource>(&mut self, battery: &mut B) {
        match read_percent(battery).await {
            Ok(percent) => self.percent = Some(percent),
            Err(e) => warn!("Battery level unavailable: {}", e),
        }
        match battery.power_state().await {
            Ok(state) => self.state = state,
            Err(e) => warn!("Battery state unavailable: {}", e),
        }
    }

    /// Apply a live battery event. Returns true if the panel changed.
    pub fn apply(&mut self, event: BatteryEvent) -> bool {
        let before = *self;
        match event {
            BatteryEvent::LevelChanged(level) => match level_to_percent(level) {
                Ok(percent) => self.percent = Some(percent),
                Err(e) => debug!("Ignoring battery level event: {}", e),
            },
            BatteryEvent::StateChanged(state) => self.state = state,
        }
        before != *self
    }

    /// `"62%"`, or `"..."` before the first reading
    pub fn level_text(&self) -> String<8> {
        let mut text = String::new();
        match self.percent {
            // "100%" is the longest possible text
            Some(percent) => {
                let _ = write!(text, "{}%", percent);
            }
            None => {
                let _ = text.push_str("...");
            }
        }
        text
    }

    pub const fn charging_text(&self) -> &'static str {
        self.state.label()
    }
}

/// Keeps a [`BatteryStatus`] in sync with live battery events.
///
/// The event listener is released when the monitor is dropped.
pub struct BatteryMonitor<'a> {
    status: BatteryStatus,
    events: Subscriber<
        'a,
        CriticalSectionRawMutex,
        BatteryEvent,
        BATTERY_EVENT_CAPACITY,
        BATTERY_EVENT_SUBSCRIBERS,
        BATTERY_EVENT_PUBLISHERS,
    >,
}

impl<'a> BatteryMonitor<'a> {
    /// Do the initial read, then start listening for level/state changes.
    ///
    /// Returns `None` when no listener slot is free on `events`.
    pub async fn start<B: BatterySource>(
        battery: &mut B,
        events: &'a BatteryEvents,
    ) -> Option<Self> {
        let mut status = BatteryStatus::new();
        status.refresh(battery).await;

        let events = events
            .subscriber()
            .map_err(|e| warn!("Battery event subscribe failed: {:?}", e))
            .ok()?;
        Some(Self { status, events })
    }

    pub fn status(&self) -> BatteryStatus {
        self.status
    }

    /// Wait for the next battery event and apply it
    pub async fn next(&mut self) -> BatteryStatus {
        let event = self.events.next_message_pure().await;
        self.status.apply(event);
        self.status
    }

    /// Apply every event already queued. Returns true if the panel changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.events.try_next_message_pure() {
            changed |= self.status.apply(event);
        }
        changed
    }
}
