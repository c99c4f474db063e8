//! Charge percentage state and its presentation helpers

use embedded_graphics::pixelcolor::Rgb565;

/// Upper bound of the charge percentage
pub const FULL_PERCENT: u8 = 100;

/// Charge held by a session.
///
/// `is_full` is a latch: it is set when a tick lands `percent` on 100 and
/// only cleared by [`ChargeState::reseed`]. It is not derived from `percent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChargeState {
    pub percent: u8,
    /// Battery level the session was seeded with
    pub initial_percent: u8,
    pub is_full: bool,
}

/// The two logical states of a charge session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePhase {
    Charging,
    Full,
}

impl ChargeState {
    pub const fn new() -> Self {
        Self {
            percent: 0,
            initial_percent: 0,
            is_full: false,
        }
    }

    /// Fresh state starting at `percent` (clamped to 100)
    pub fn seeded(percent: u8) -> Self {
        let percent = percent.min(FULL_PERCENT);
        Self {
            percent,
            initial_percent: percent,
            is_full: false,
        }
    }

    /// Take the first battery reading of a session. The full latch is kept.
    pub fn seed(&mut self, percent: u8) {
        let percent = percent.min(FULL_PERCENT);
        self.percent = percent;
        self.initial_percent = percent;
    }

    /// Overwrite percent and initial percent and clear the full latch
    pub fn reseed(&mut self, percent: u8) {
        *self = Self::seeded(percent);
    }

    /// Add one tick's worth of charge, saturating at 100.
    ///
    /// Returns true if this tick latched the full flag.
    pub fn apply_tick(&mut self, increment: u8) -> bool {
        self.percent = self.percent.saturating_add(increment).min(FULL_PERCENT);
        if self.percent == FULL_PERCENT && !self.is_full {
            self.is_full = true;
            return true;
        }
        false
    }

    pub const fn phase(&self) -> ChargePhase {
        if self.is_full {
            ChargePhase::Full
        } else {
            ChargePhase::Charging
        }
    }

    /// Status line shown under the battery bar
    pub const fn status_text(&self) -> &'static str {
        match self.phase() {
            ChargePhase::Full => "Fully charged",
            ChargePhase::Charging => "Shake your phone to fill the battery",
        }
    }

    pub const fn fill_band(&self) -> FillBand {
        FillBand::for_percent(self.percent)
    }

    /// Width of the filled part of a bar `total` units wide
    pub const fn fill_width(&self, total: u32) -> u32 {
        // percent <= 100, so the quotient fits back in u32
        (self.percent as u64 * total as u64 / FULL_PERCENT as u64) as u32
    }
}

/// Colour band of the battery fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillBand {
    /// Below 20%
    Low,
    /// 20% to 50% inclusive
    Medium,
    /// Above 50%
    High,
}

impl FillBand {
    pub const fn for_percent(percent: u8) -> Self {
        if percent < 20 {
            Self::Low
        } else if percent <= 50 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Get the display color for this band
    pub const fn color(self) -> Rgb565 {
        match self {
            // #e53935
            Self::Low => Rgb565::new(28, 14, 6),
            // #fdd835
            Self::Medium => Rgb565::new(31, 54, 6),
            // #43a047
            Self::High => Rgb565::new(8, 40, 8),
        }
    }
}
