use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};
use embassy_time::Duration;
use log::{debug, info};

use super::{AccelSample, SensorError};
use crate::config::FAST_SAMPLE_INTERVAL_MS;

/// Channel capacity for motion events
/// Subscribers that fall further behind than this skip the oldest samples
pub const MOTION_CHANNEL_CAPACITY: usize = 8;

/// Number of listeners that can be attached at once
/// - Listener 0: charge session
/// - Listener 1: motion readout panel
/// - Remaining slots for diagnostics
pub const MOTION_SUBSCRIBERS: usize = 4;

/// Publisher slots. The hub publishes through its immediate publisher, which
/// does not take a slot.
pub const MOTION_PUBLISHERS: usize = 1;

#[derive(Debug, Clone, Copy)]
enum MotionEvent {
    Sample(AccelSample),
    /// Every listener attached before this event is detached
    ListenersRemoved,
}

type MotionChannel = PubSubChannel<
    CriticalSectionRawMutex,
    MotionEvent,
    MOTION_CHANNEL_CAPACITY,
    MOTION_SUBSCRIBERS,
    MOTION_PUBLISHERS,
>;

/// Fan-out point between an accelerometer driver and its listeners.
///
/// The driver side calls [`MotionHub::publish`] at the pace given by
/// [`MotionHub::update_interval`]. Listeners hold a [`MotionSubscription`],
/// which unsubscribes when dropped. [`MotionHub::remove_all_listeners`]
/// detaches every current listener at once.
pub struct MotionHub {
    channel: MotionChannel,
    interval_ms: Mutex<CriticalSectionRawMutex, Cell<u64>>,
    /// Bumped by `remove_all_listeners`; subscriptions from an older
    /// generation are detached
    generation: Mutex<CriticalSectionRawMutex, Cell<u32>>,
}

impl MotionHub {
    pub const fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
            interval_ms: Mutex::new(Cell::new(FAST_SAMPLE_INTERVAL_MS)),
            generation: Mutex::new(Cell::new(0)),
        }
    }

    /// Change the nominal interval between samples. Takes effect on the
    /// driver's next pacing decision.
    pub fn set_update_interval(&self, interval: Duration) {
        let ms = interval.as_millis().max(1);
        let previous = self.interval_ms.lock(|cell| cell.replace(ms));
        if previous != ms {
            info!("Accelerometer interval {}ms -> {}ms", previous, ms);
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.lock(|cell| cell.get()))
    }

    /// Attach a new listener. It receives samples published from now on.
    pub fn subscribe(&self) -> Result<MotionSubscription<'_>, SensorError> {
        let subscriber = self.channel.subscriber().map_err(|e| {
            log::error!("Motion hub subscribe failed: {:?}", e);
            SensorError::ListenerLimit
        })?;

        Ok(MotionSubscription {
            hub: self,
            subscriber,
            generation: self.generation(),
            detached: false,
        })
    }

    /// Deliver a sample to every attached listener
    pub fn publish(&self, sample: AccelSample) {
        self.channel
            .immediate_publisher()
            .publish_immediate(MotionEvent::Sample(sample));
    }

    /// Detach every listener currently attached. Their next read returns `None`.
    pub fn remove_all_listeners(&self) {
        self.generation
            .lock(|cell| cell.set(cell.get().wrapping_add(1)));
        self.channel
            .immediate_publisher()
            .publish_immediate(MotionEvent::ListenersRemoved);
        debug!("All motion listeners removed");
    }

    fn generation(&self) -> u32 {
        self.generation.lock(|cell| cell.get())
    }
}

impl Default for MotionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A listener slot on a [`MotionHub`]. Dropping it frees the slot.
pub struct MotionSubscription<'h> {
    hub: &'h MotionHub,
    subscriber: Subscriber<
        'h,
        CriticalSectionRawMutex,
        MotionEvent,
        MOTION_CHANNEL_CAPACITY,
        MOTION_SUBSCRIBERS,
        MOTION_PUBLISHERS,
    >,
    generation: u32,
    detached: bool,
}

impl<'h> MotionSubscription<'h> {
    /// Wait for the next sample. Returns `None` once the listener has been
    /// detached by [`MotionHub::remove_all_listeners`].
    pub async fn next(&mut self) -> Option<AccelSample> {
        if self.is_detached() {
            return None;
        }
        let event = self.subscriber.next_message_pure().await;
        self.accept(event)
    }

    /// Take an already-published sample without waiting
    pub fn try_next(&mut self) -> Option<AccelSample> {
        if self.is_detached() {
            return None;
        }
        let event = self.subscriber.try_next_message_pure()?;
        self.accept(event)
    }

    pub fn is_detached(&self) -> bool {
        self.detached || self.hub.generation() != self.generation
    }

    fn accept(&mut self, event: MotionEvent) -> Option<AccelSample> {
        match event {
            MotionEvent::Sample(sample) if !self.is_detached() => Some(sample),
            _ => {
                self.detached = true;
                None
            }
        }
    }
}
