//! Common error definitions.

use core::fmt;

/// Alias for Result<T, RccError>.
pub type Result<T> = core::result::Result<T, RccError>;

/// A configuration field that failed value inspection.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field {
    /// Not one of 1, 2, 4, 8, 16, 64, 128, 256, 512.
    AhbDivider,
    /// Not one of 1, 2, 4, 8, 16.
    Apb1Divider,
    /// Not one of 1, 2, 4, 8, 16.
    Apb2Divider,
    PllM,
    PllN,
    /// Not one of 2, 4, 6, 8.
    PllP,
    PllQ,
    PllR,
    /// HSE is required, but no mode was given, or the mode conflicts with a running HSE
    /// that feeds the active system clock.
    HseMode,
    /// The board HSE frequency is outside what the selected mode accepts.
    HseFrequency,
}

/// Which part of the PLL is outside its band.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllStage {
    /// Oscillator frequency / PLLM
    VcoInput,
    /// VCO input * PLLN
    VcoOutput,
}

/// A clock domain with a rated maximum.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bus {
    Sysclk,
    Ahb,
    Apb1,
    Apb2,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oscillator {
    Hsi,
    Hse,
}

/// Clock configuration errors.
///
/// The first three are found by inspecting the requested configuration, before any register
/// is written; retrying with a corrected configuration is always safe. The timeouts are
/// returned when a bounded readiness poll exceeds its iteration budget. They are never retried
/// here, since a stuck oscillator or PLL usually points at missing or faulty hardware.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RccError {
    /// A field is out of range, or contradicts another field.
    InvalidParameter(Field),
    /// The PLL's VCO input or output frequency is outside the datasheet band.
    PllRangeViolation(PllStage),
    /// A resulting clock would exceed its rated maximum.
    BusOverclock(Bus),
    /// An oscillator's ready flag didn't assert in time.
    OscillatorStartupTimeout(Oscillator),
    /// The PLL didn't lock (or didn't stop) in time.
    PllLockTimeout,
    /// SWS didn't report the newly selected source in time.
    ClockSwitchTimeout,
}

impl RccError {
    /// The configuration was rejected before any register write.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter(_) | Self::PllRangeViolation(_) | Self::BusOverclock(_)
        )
    }

    /// A hardware readiness poll ran out of iterations.
    pub fn is_timeout(&self) -> bool {
        !self.is_validation()
    }
}

impl fmt::Display for RccError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(field) => write!(f, "invalid clock parameter: {field:?}"),
            Self::PllRangeViolation(stage) => write!(f, "PLL {stage:?} frequency out of band"),
            Self::BusOverclock(bus) => write!(f, "{bus:?} clock above its rated maximum"),
            Self::OscillatorStartupTimeout(osc) => write!(f, "{osc:?} oscillator not ready"),
            Self::PllLockTimeout => f.write_str("PLL failed to lock"),
            Self::ClockSwitchTimeout => f.write_str("system clock switch not confirmed"),
        }
    }
}

impl core::error::Error for RccError {}
