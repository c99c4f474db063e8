//! Shake-to-charge session
//!
//! A [`ChargeSession`] owns the charge state and the shake detector behind a
//! single critical-section mutex. Every mutation (sample, seed, reset) takes
//! that lock once and never holds it across an `.await`, so a battery read
//! that completes while ticks are arriving overwrites the state in one step
//! and cannot lose an update.
//!
//! Listening is scoped: [`ChargeSession::start`] returns an
//! [`ActiveSession`] holding the motion subscription. Dropping it (or calling
//! [`ActiveSession::stop`]) unsubscribes and ends the session, and any battery
//! read still in flight is discarded when it completes.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::battery::{BatterySource, read_percent};
use crate::charge::ChargeState;
use crate::config::ShakeConfig;
use crate::detector::{ChargeTick, ShakeDetector};
use crate::sensors::{AccelSample, MotionHub, MotionSubscription};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("Charge session is already running")]
    AlreadyRunning,
    #[error("Motion hub has no free listener slots")]
    ListenerLimit,
}


struct SessionInner {
    charge: ChargeState,
    detector: ShakeDetector,
    /// Incremented on every start and stop. Battery reads remember the epoch
    /// they began in and are dropped if it has moved on.
    epoch: u32,
    live: bool,
    /// Set once a seed or reset has landed in this run
    seeded: bool,
}

/// Charge state plus detector for one shake-to-charge screen.
pub struct ChargeSession {
    config: ShakeConfig,
    inner: Mutex<CriticalSectionRawMutex, RefCell<SessionInner>>,
    /// Latest charge after each seed, reset or tick
    updates: Signal<CriticalSectionRawMutex, ChargeState>,
}

impl ChargeSession {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(SessionInner {
                charge: ChargeState::new(),
                detector: ShakeDetector::new(&config),
                epoch: 0,
                live: false,
                seeded: false,
            })),
            config,
            updates: Signal::new(),
        }
    }

    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ChargeState {
        self.inner.lock(|cell| cell.borrow().charge)
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock(|cell| cell.borrow().live)
    }

    /// Begin listening to `hub` at the configured sample interval.
    ///
    /// Charge restarts from zero until [`ChargeSession::seed`] completes.
    pub fn start<'s, 'h>(
        &'s self,
        hub: &'h MotionHub,
    ) -> Result<ActiveSession<'s, 'h>, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        hub.set_update_interval(self.config.sample_interval());
        let subscription = hub.subscribe().map_err(|e| {
            warn!("Charge session could not subscribe: {}", e);
            SessionError::ListenerLimit
        })?;

        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.charge = ChargeState::new();
            inner.detector.clear();
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.live = true;
            inner.seeded = false;
        });
        info!(
            "Charge session started (threshold {}, tick {}ms)",
            self.config.shake_threshold, self.config.tick_interval_ms
        );

        Ok(ActiveSession {
            session: self,
            subscription,
        })
    }

    fn end(&self) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.live = false;
        });
        info!("Charge session stopped");
    }

    /// Feed one accelerometer sample observed at `now`.
    ///
    /// Ignored while the session is not running.
    pub fn on_sample(&self, sample: &AccelSample, now: Instant) -> Option<ChargeTick> {
        let (tick, charge) = self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let SessionInner {
                charge,
                detector,
                live,
                ..
            } = &mut *inner;
            if !*live {
                return None;
            }
            let tick = detector.on_sample(sample, now, charge)?;
            Some((tick, *charge))
        })?;

        if tick.became_full {
            info!("Battery fully charged");
        }
        self.updates.signal(charge);
        Some(tick)
    }

    /// Seed the charge from the device battery.
    ///
    /// Only the first seed of a run applies. A failed read falls back to the
    /// configured fallback percent. Returns the applied state, or `None` if
    /// the run was already seeded or reset, or the session stopped while the
    /// read was in flight.
    pub async fn seed<B: BatterySource>(&self, battery: &mut B) -> Option<ChargeState> {
        let epoch = self.current_epoch()?;
        if self.inner.lock(|cell| cell.borrow().seeded) {
            debug!("Charge already seeded, ignoring seed");
            return None;
        }

        let percent = match read_percent(battery).await {
            Ok(percent) => percent,
            Err(e) => {
                warn!(
                    "Battery read failed ({}), seeding with {}%",
                    e, self.config.fallback_percent
                );
                self.config.fallback_percent
            }
        };

        let state = self.apply_read(epoch, ReadKind::Seed, |charge| charge.seed(percent))?;
        info!("Charge seeded at {}%", state.percent);
        Some(state)
    }

    /// Re-seed from the device battery and clear the full flag.
    ///
    /// A failed read leaves the state untouched. Returns the applied state,
    /// or `None` if nothing changed.
    pub async fn reset<B: BatterySource>(&self, battery: &mut B) -> Option<ChargeState> {
        let epoch = self.current_epoch()?;

        let percent = match read_percent(battery).await {
            Ok(percent) => percent,
            Err(e) => {
                debug!("Battery read failed during reset: {}", e);
                return None;
            }
        };

        let state = self.apply_read(epoch, ReadKind::Reset, |charge| {
            charge.reseed(percent);
        })?;
        info!("Charge reset to {}%", state.percent);
        Some(state)
    }

    /// Wait for the next charge change
    pub async fn wait_update(&self) -> ChargeState {
        self.updates.wait().await
    }

    /// Take the latest charge change, if any arrived since the last take
    pub fn try_update(&self) -> Option<ChargeState> {
        self.updates.try_take()
    }

    fn current_epoch(&self) -> Option<u32> {
        let epoch = self.inner.lock(|cell| {
            let inner = cell.borrow();
            inner.live.then_some(inner.epoch)
        });
        if epoch.is_none() {
            debug!("Battery read skipped, session not running");
        }
        epoch
    }

    /// Apply the result of a battery read that began in `epoch`.
    ///
    /// A seed that completes after another seed or reset already landed is
    /// dropped, so it cannot clobber the newer reading.
    fn apply_read(
        &self,
        epoch: u32,
        kind: ReadKind,
        f: impl FnOnce(&mut ChargeState),
    ) -> Option<ChargeState> {
        let state = self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            if !inner.live || inner.epoch != epoch {
                return None;
            }
            if kind == ReadKind::Seed && inner.seeded {
                return None;
            }
            f(&mut inner.charge);
            inner.seeded = true;
            Some(inner.charge)
        });

        match state {
            Some(state) => self.updates.signal(state),
            None => debug!("Discarding battery read from a finished session"),
        }
        state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadKind {
    Seed,
    Reset,
}

impl Default for ChargeSession {
    fn default() -> Self {
        Self::new(ShakeConfig::default())
    }
}

/// A running [`ChargeSession`] and its motion subscription.
///
/// Dropping it unsubscribes from the hub and ends the session.
pub struct ActiveSession<'s, 'h> {
    session: &'s ChargeSession,
    subscription: MotionSubscription<'h>,
}

impl<'s, 'h> ActiveSession<'s, 'h> {
    pub fn session(&self) -> &'s ChargeSession {
        self.session
    }

    /// Process samples as they arrive, stamping each with its arrival time.
    ///
    /// Returns once the listener is detached from the hub. Dropping the
    /// future is the way to cancel.
    pub async fn run(&mut self) {
        while let Some(sample) = self.subscription.next().await {
            self.session.on_sample(&sample, Instant::now());
        }
        info!("Charge session detached from accelerometer");
    }

    /// Process every sample already queued as if it arrived at `now`.
    /// Returns the number of accepted ticks.
    pub fn process_pending(&mut self, now: Instant) -> usize {
        let mut ticks = 0;
        while let Some(sample) = self.subscription.try_next() {
            if self.session.on_sample(&sample, now).is_some() {
                ticks += 1;
            }
        }
        ticks
    }

    pub fn is_detached(&self) -> bool {
        self.subscription.is_detached()
    }

    /// End the session. Same as dropping it.
    pub fn stop(self) {}
}

impl Drop for ActiveSession<'_, '_> {
    fn drop(&mut self) {
        self.session.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::{BatteryError, BatteryState};
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_futures::yield_now;
    use embassy_time::Duration;

    const SHAKE: AccelSample = AccelSample::new(1.5, 0.0, 1.5);

    struct FixedBattery(Result<f32, BatteryError>);

    impl BatterySource for FixedBattery {
        async fn level(&mut self) -> Result<f32, BatteryError> {
            self.0
        }

        async fn power_state(&mut self) -> Result<BatteryState, BatteryError> {
            Ok(BatteryState::Unplugged)
        }
    }

    /// Battery whose level read stays pending until the test releases it
    struct GatedBattery<'g> {
        gate: &'g Signal<CriticalSectionRawMutex, Result<f32, BatteryError>>,
    }

    impl BatterySource for GatedBattery<'_> {
        async fn level(&mut self) -> Result<f32, BatteryError> {
            self.gate.wait().await
        }

        async fn power_state(&mut self) -> Result<BatteryState, BatteryError> {
            Ok(BatteryState::Unknown)
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_seed_from_battery() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();

        let state = block_on(session.seed(&mut FixedBattery(Ok(0.62)))).unwrap();
        assert_eq!(state, ChargeState::seeded(62));
        assert_eq!(session.snapshot(), ChargeState::seeded(62));
        assert_eq!(session.try_update(), Some(ChargeState::seeded(62)));
    }

    #[test]
    fn test_seed_failure_falls_back() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();

        block_on(session.seed(&mut FixedBattery(Err(BatteryError::Unavailable))));
        let state = session.snapshot();
        assert_eq!(state.percent, 25);
        assert_eq!(state.initial_percent, 25);
        assert!(!state.is_full);
    }

    #[test]
    fn test_start_sets_interval_and_rejects_double_start() {
        let hub = MotionHub::new();
        hub.set_update_interval(Duration::from_millis(1000));
        let session = ChargeSession::default();

        let active = session.start(&hub).unwrap();
        assert_eq!(hub.update_interval(), Duration::from_millis(200));
        assert!(session.is_running());
        assert!(matches!(
            session.start(&hub),
            Err(SessionError::AlreadyRunning)
        ));

        active.stop();
        assert!(!session.is_running());
        assert!(session.start(&hub).is_ok());
    }

    #[test]
    fn test_start_on_full_hub_reports_listener_limit() {
        let hub = MotionHub::new();
        let _taken = [
            hub.subscribe().unwrap(),
            hub.subscribe().unwrap(),
            hub.subscribe().unwrap(),
            hub.subscribe().unwrap(),
        ];
        let session = ChargeSession::default();

        assert!(matches!(
            session.start(&hub),
            Err(SessionError::ListenerLimit)
        ));
        assert!(!session.is_running());
    }

    #[test]
    fn test_samples_ignored_when_not_running() {
        let session = ChargeSession::default();
        assert_eq!(session.on_sample(&SHAKE, at(0)), None);
        assert_eq!(session.snapshot(), ChargeState::new());
    }

    #[test]
    fn test_reset_restores_battery_and_clears_full() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.99))));

        let tick = session.on_sample(&SHAKE, at(0)).unwrap();
        assert!(tick.became_full);
        assert!(session.snapshot().is_full);

        let state = block_on(session.reset(&mut FixedBattery(Ok(0.4)))).unwrap();
        assert_eq!(state, ChargeState::seeded(40));
        assert_eq!(session.snapshot(), ChargeState::seeded(40));
    }

    #[test]
    fn test_reset_failure_keeps_state() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.5))));
        session.on_sample(&SHAKE, at(0));
        let before = session.snapshot();

        let result = block_on(session.reset(&mut FixedBattery(Err(BatteryError::Unavailable))));
        assert_eq!(result, None);
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_pending_reset_that_fails_keeps_ticks() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.5))));

        let gate = Signal::new();
        let mut battery = GatedBattery { gate: &gate };
        let (result, ()) = block_on(join(session.reset(&mut battery), async {
            // Ticks land while the reset read is still pending
            session.on_sample(&SHAKE, at(0));
            session.on_sample(&SHAKE, at(200));
            gate.signal(Err(BatteryError::Unavailable));
        }));

        assert_eq!(result, None);
        let state = session.snapshot();
        assert_eq!(state.percent, 52);
        assert_eq!(state.initial_percent, 50);
    }

    #[test]
    fn test_completing_reset_overwrites_atomically() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.5))));

        let gate = Signal::new();
        let mut battery = GatedBattery { gate: &gate };
        block_on(join(session.reset(&mut battery), async {
            session.on_sample(&SHAKE, at(0));
            gate.signal(Ok(0.3));
        }));
        assert_eq!(session.snapshot(), ChargeState::seeded(30));

        // Ticks after the reset build on the fresh reading
        session.on_sample(&SHAKE, at(200));
        assert_eq!(session.snapshot().percent, 31);
    }

    #[test]
    fn test_second_seed_is_ignored() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.5))));
        session.on_sample(&SHAKE, at(0));

        assert_eq!(block_on(session.seed(&mut FixedBattery(Ok(0.8)))), None);
        let state = session.snapshot();
        assert_eq!(state.percent, 51);
        assert_eq!(state.initial_percent, 50);
    }

    #[test]
    fn test_slow_seed_after_reset_is_dropped() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let _active = session.start(&hub).unwrap();

        let gate = Signal::new();
        let mut slow = GatedBattery { gate: &gate };
        let (seeded, reset) = block_on(join(session.seed(&mut slow), async {
            let reset = session.reset(&mut FixedBattery(Ok(0.4))).await;
            gate.signal(Ok(0.9));
            reset
        }));

        assert_eq!(seeded, None);
        assert_eq!(reset, Some(ChargeState::seeded(40)));
        assert_eq!(session.snapshot(), ChargeState::seeded(40));
    }

    #[test]
    fn test_restart_allows_a_fresh_seed() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.5))));
        active.stop();

        let _active = session.start(&hub).unwrap();
        let state = block_on(session.seed(&mut FixedBattery(Ok(0.7))));
        assert_eq!(state, Some(ChargeState::seeded(70)));
    }

    #[test]
    fn test_read_after_teardown_is_discarded() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let active = session.start(&hub).unwrap();

        let gate = Signal::new();
        let mut battery = GatedBattery { gate: &gate };
        let (result, ()) = block_on(join(session.seed(&mut battery), async {
            drop(active);
            gate.signal(Ok(0.9));
        }));

        assert_eq!(result, None);
        assert_eq!(session.snapshot(), ChargeState::new());
        assert_eq!(session.try_update(), None);
    }

    #[test]
    fn test_read_from_previous_run_is_discarded() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let active = session.start(&hub).unwrap();

        let gate = Signal::new();
        let mut battery = GatedBattery { gate: &gate };
        let (result, _restarted) = block_on(join(session.seed(&mut battery), async {
            drop(active);
            let restarted = session.start(&hub).unwrap();
            gate.signal(Ok(0.9));
            restarted
        }));

        assert_eq!(result, None);
        assert!(session.is_running());
        assert_eq!(session.snapshot(), ChargeState::new());
    }

    #[test]
    fn test_stop_releases_listener() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        {
            let _active = session.start(&hub).unwrap();
            let _others = [
                hub.subscribe().unwrap(),
                hub.subscribe().unwrap(),
                hub.subscribe().unwrap(),
            ];
            assert!(hub.subscribe().is_err());
        }
        // All four slots are free again
        let _all = [
            hub.subscribe().unwrap(),
            hub.subscribe().unwrap(),
            hub.subscribe().unwrap(),
            hub.subscribe().unwrap(),
        ];
    }

    #[test]
    fn test_process_pending_debounces_queued_burst() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let mut active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.5))));

        hub.publish(SHAKE);
        hub.publish(SHAKE);
        hub.publish(AccelSample::new(0.0, 0.0, 1.0));
        assert_eq!(active.process_pending(at(0)), 1);

        hub.publish(SHAKE);
        assert_eq!(active.process_pending(at(200)), 1);
        assert_eq!(session.snapshot().percent, 52);
    }

    #[test]
    fn test_run_until_listeners_removed() {
        let hub = MotionHub::new();
        let session = ChargeSession::default();
        let mut active = session.start(&hub).unwrap();
        block_on(session.seed(&mut FixedBattery(Ok(0.5))));

        block_on(join(active.run(), async {
            // Three shakes arriving back to back fall in one debounce window
            hub.publish(SHAKE);
            hub.publish(SHAKE);
            hub.publish(SHAKE);
            yield_now().await;
            hub.remove_all_listeners();
        }));
        assert!(active.is_detached());
        assert_eq!(session.snapshot().percent, 51);
        // Detached, but still the running session until dropped
        assert!(session.is_running());
    }
}
