/// Which of the two demo screens is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenMode {
    /// Accelerometer and battery readouts
    #[default]
    Demo,
    /// Shake-to-charge battery bar
    Shake,
}

impl ScreenMode {
    /// Get a short label for the toggle button
    pub const fn label(self) -> &'static str {
        match self {
            Self::Demo => "Demo",
            Self::Shake => "Shake to Charge",
        }
    }

    pub const fn toggle(self) -> Self {
        match self {
            Self::Demo => Self::Shake,
            Self::Shake => Self::Demo,
        }
    }
}
