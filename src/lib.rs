//! Clock tree resolution and switch-over for the STM32F446.
//!
//! [`clocks::ClockConfig`] describes a clock tree: the system clock source, the main PLL's
//! factors, and the bus prescalers. [`clocks::Rcc`] validates a configuration against the
//! device's limits, then moves the running hardware over to it in an order that never puts a bus
//! above its rated frequency, even halfway through. The frequency getters read the registers
//! each time, so they always describe what the hardware is running at.
//!
//! Hardware access goes through the [`clocks::ClockRegisters`] trait. With the `f446` feature,
//! [`clocks::PacRegisters`] implements it over the `stm32f4` PAC; tests can substitute a
//! simulated register block.
//!
//! Logging uses `defmt` or `log`, selected by the feature of the same name.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "f446")] {
        pub use stm32f4::stm32f446 as pac;
    }
}

pub mod clocks;
pub mod error;
mod util;

pub use clocks::{ClockCfg, ClockConfig, Clocks, Rcc, RccSettings};
pub use error::{RccError, Result};
