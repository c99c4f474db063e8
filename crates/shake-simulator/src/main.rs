//! Desktop simulator for the shake-to-charge demo.
//!
//! Drives shake-core with a synthetic accelerometer and battery so both
//! screens can be exercised without a device. Runs the demo screen (live
//! readout and battery panel) followed by the shake screen (charge session
//! with one reset midway), logging what each screen would show.
//!
//! Time is simulated: each step advances the clock by the hub's current
//! sample interval. Pass `--realtime` to sleep between steps instead of
//! running flat out.
//!
//! # Environment
//!
//! | Variable                 | Effect                                  |
//! |--------------------------|-----------------------------------------|
//! | `RUST_LOG`               | Log filter, e.g. `debug` to see ticks   |
//! | `SHAKE_SIM_BATTERY=fail` | Battery reads fail (fallback / no-op)   |
//! | `SHAKE_SIM_SENSOR=flaky` | Every 25th accelerometer read fails     |

use std::time::Duration as StdDuration;

use embassy_futures::block_on;
use embassy_time::{Duration, Instant};
use log::{error, info, warn};

use shake_core::battery::{BatteryEvent, BatteryEvents, BatteryMonitor};
use shake_core::readout::MotionReadout;
use shake_core::sensors::pump_once;
use shake_core::{
    AccelSample, BatteryError, BatterySource, BatteryState, ChargeSession, MotionHub,
    MotionSensor, ScreenMode, SensorError, ShakeConfig,
};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Time spent on the demo screen.
const DEMO_SCREEN_MS: u64 = 4_000;

/// Time spent on the shake screen.
const SHAKE_SCREEN_MS: u64 = 60_000;

/// A shake burst starts every this many ms...
const SHAKE_PERIOD_MS: u64 = 6_000;

/// ...and lasts this long.
const SHAKE_BURST_MS: u64 = 4_000;

/// With `SHAKE_SIM_SENSOR=flaky`, one read in this many fails.
const FLAKY_READ_EVERY: u32 = 25;

/// Battery level reported by the mock battery.
const MOCK_BATTERY_LEVEL: f32 = 0.62;

// ---------------------------------------------------------------------------
// Mock devices
// ---------------------------------------------------------------------------

/// Synthetic accelerometer: 1 g at rest with small jitter, vigorous
/// oscillation during periodic shake bursts.
struct MockAccelerometer {
    clock_ms: u64,
    jitter_state: u32,
    reads: u32,
    flaky: bool,
}

impl MockAccelerometer {
    fn from_env() -> Self {
        let flaky = std::env::var("SHAKE_SIM_SENSOR").is_ok_and(|v| v == "flaky");
        if flaky {
            warn!("Mock accelerometer fails every {} reads", FLAKY_READ_EVERY);
        }
        Self {
            clock_ms: 0,
            jitter_state: 0x1234_5678,
            reads: 0,
            flaky,
        }
    }

    fn advance(&mut self, dt: Duration) {
        self.clock_ms += dt.as_millis();
    }

    /// Small deterministic noise in [-0.02, 0.02].
    fn jitter(&mut self) -> f32 {
        // xorshift32
        self.jitter_state ^= self.jitter_state << 13;
        self.jitter_state ^= self.jitter_state >> 17;
        self.jitter_state ^= self.jitter_state << 5;
        (self.jitter_state % 4001) as f32 / 100_000.0 - 0.02
    }
}

impl MotionSensor for MockAccelerometer {
    async fn read(&mut self) -> Result<AccelSample, SensorError> {
        self.reads = self.reads.wrapping_add(1);
        if self.flaky && self.reads % FLAKY_READ_EVERY == 0 {
            return Err(SensorError::ReadFailed {
                sensor: "mock accelerometer",
                details: "simulated bus error",
            });
        }

        let t = self.clock_ms as f32 / 1000.0;
        let shaking = self.clock_ms % SHAKE_PERIOD_MS < SHAKE_BURST_MS;

        let sample = if shaking {
            AccelSample::new(
                1.6 * (t * 17.0).sin() + self.jitter(),
                0.8 * (t * 11.0).cos() + self.jitter(),
                1.0 + 0.9 * (t * 23.0).sin(),
            )
        } else {
            AccelSample::new(self.jitter(), self.jitter(), 1.0 + self.jitter())
        };
        Ok(sample)
    }
}

/// Battery that reports a fixed level, or always fails.
struct MockBattery {
    fail: bool,
}

impl MockBattery {
    fn from_env() -> Self {
        let fail = std::env::var("SHAKE_SIM_BATTERY").is_ok_and(|v| v == "fail");
        if fail {
            warn!("Mock battery configured to fail every read");
        }
        Self { fail }
    }
}

impl BatterySource for MockBattery {
    async fn level(&mut self) -> Result<f32, BatteryError> {
        if self.fail {
            return Err(BatteryError::Unavailable);
        }
        Ok(MOCK_BATTERY_LEVEL)
    }

    async fn power_state(&mut self) -> Result<BatteryState, BatteryError> {
        if self.fail {
            return Err(BatteryError::ReadFailed {
                operation: "power state",
                details: "no fuel gauge",
            });
        }
        Ok(BatteryState::Unplugged)
    }
}

// ---------------------------------------------------------------------------
// Screens
// ---------------------------------------------------------------------------

struct Simulation {
    hub: MotionHub,
    battery_events: BatteryEvents,
    sensor: MockAccelerometer,
    battery: MockBattery,
    realtime: bool,
}

/// Advance the clock by one hub interval and deliver a sample.
async fn step(hub: &MotionHub, sensor: &mut MockAccelerometer, realtime: bool) -> Duration {
    let dt = hub.update_interval();
    if realtime {
        std::thread::sleep(StdDuration::from_millis(dt.as_millis()));
    }
    sensor.advance(dt);
    if let Err(e) = pump_once(sensor, hub).await {
        error!("Sensor pump failed: {}", e);
    }
    dt
}

impl Simulation {
    async fn demo_screen(&mut self) {
        info!("=== {} ===", ScreenMode::Demo.label());
        let Self {
            hub,
            battery_events,
            sensor,
            battery,
            realtime,
        } = self;

        let Some(mut monitor) = BatteryMonitor::start(battery, battery_events).await else {
            error!("Battery monitor could not subscribe");
            return;
        };
        let status = monitor.status();
        info!("Battery: {} ({})", status.level_text(), status.charging_text());

        let mut readout = match MotionReadout::new(hub) {
            Ok(readout) => readout,
            Err(e) => {
                error!("Readout could not subscribe: {}", e);
                return;
            }
        };

        let mut elapsed = 0;
        while elapsed < DEMO_SCREEN_MS {
            elapsed += step(hub, sensor, *realtime).await.as_millis();
            if readout.poll() {
                let [x, y, z] = readout.axis_lines();
                info!("{x}  {y}  {z}");
            }

            match elapsed {
                1_000 => {
                    info!("[Slow]");
                    readout.slow();
                }
                2_000 => {
                    info!("[Fast]");
                    readout.fast();
                    battery_events
                        .immediate_publisher()
                        .publish_immediate(BatteryEvent::StateChanged(BatteryState::Charging));
                }
                3_000 => {
                    info!("[Off]");
                    if let Err(e) = readout.toggle() {
                        error!("Readout toggle failed: {}", e);
                    }
                }
                3_400 => {
                    info!("[On]");
                    if let Err(e) = readout.toggle() {
                        error!("Readout toggle failed: {}", e);
                    }
                }
                _ => {}
            }

            if monitor.poll() {
                let status = monitor.status();
                info!("Battery: {} ({})", status.level_text(), status.charging_text());
            }
        }
    }

    async fn shake_screen(&mut self, config: ShakeConfig) {
        info!("=== {} ===", ScreenMode::Shake.label());
        let Self {
            hub,
            sensor,
            battery,
            realtime,
            ..
        } = self;

        let session = ChargeSession::new(config);
        let mut active = match session.start(hub) {
            Ok(active) => active,
            Err(e) => {
                error!("Charge session failed to start: {}", e);
                return;
            }
        };
        if let Some(state) = session.seed(battery).await {
            info!("Starts at your real battery: {}%", state.initial_percent);
        }

        let mut clock_ms = 0;
        let mut reset_done = false;
        let mut last_shown = None;
        while clock_ms < SHAKE_SCREEN_MS {
            clock_ms += step(hub, sensor, *realtime).await.as_millis();
            active.process_pending(Instant::from_millis(clock_ms));

            if !reset_done && clock_ms >= SHAKE_SCREEN_MS / 2 {
                info!("[Reset to real battery]");
                if session.reset(battery).await.is_none() {
                    info!("Reset had no effect");
                }
                reset_done = true;
            }

            if let Some(state) = session.try_update() {
                // Log every 5% so the output stays readable
                let bucket = state.percent / 5;
                if last_shown != Some(bucket) || state.is_full {
                    last_shown = Some(bucket);
                    info!(
                        "{:>3}% [{:<26}] {:?} | {}",
                        state.percent,
                        "#".repeat(state.fill_width(26) as usize),
                        state.fill_band(),
                        state.status_text()
                    );
                }
            }
        }

        active.stop();
        let state = session.snapshot();
        info!(
            "Final charge {}% (started at {}%, full: {})",
            state.percent, state.initial_percent, state.is_full
        );
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting shake-charge simulator");

    let realtime = std::env::args().any(|arg| arg == "--realtime");
    let config = ShakeConfig::default();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return;
    }

    let mut sim = Simulation {
        hub: MotionHub::new(),
        battery_events: BatteryEvents::new(),
        sensor: MockAccelerometer::from_env(),
        battery: MockBattery::from_env(),
        realtime,
    };

    let mut mode = ScreenMode::default();
    block_on(sim.demo_screen());
    mode = mode.toggle();
    info!("Switched to {}", mode.label());
    block_on(sim.shake_screen(config));

    info!("Simulator exiting");
}
