//! This module contains clock configurations for the STM32F446: resolving a configuration into
//! frequencies, validating it against the device limits, and switching the running clock tree
//! over to it.
//!
//! Typical use:
//! ```ignore
//! let mut rcc = Rcc::new(PacRegisters::new(dp.RCC, dp.FLASH));
//! rcc.set_system_clock(&ClockConfig::default())?;
//! let baud_base = rcc.peripheral_bus2_frequency();
//! ```

use cfg_if::cfg_if;

mod config;
mod freq;
mod rcc;
mod regs;
mod switch;

#[cfg(test)]
mod sim;

cfg_if! {
    if #[cfg(feature = "f446")] {
        mod pac;
        pub use pac::PacRegisters;
    }
}

pub use config::{
    ApbPrescaler, ClockConfig, HclkPrescaler, HseMode, PllSrc, Pllp, SysclkSrc, Validated,
    WaitState,
};
pub use freq::{Clocks, divided, vco_input, vco_output};
pub use rcc::{Rcc, RccSettings, Retries};
pub use regs::{Cfgr, ClockRegisters, Cr, FlashAcr, Pllcfgr, Reg};

pub use crate::error::RccError;

/// Internal high-speed oscillator, in Hz.
pub const HSI_FREQ: u32 = 16_000_000;
/// HSE frequency assumed unless `RccSettings::hse_freq` says otherwise. Matches the ST-LINK
/// MCO output on Nucleo-F446RE boards.
pub const DEFAULT_HSE_FREQ: u32 = 8_000_000;

pub const HSE_CRYSTAL_MIN: u32 = 4_000_000;
pub const HSE_CRYSTAL_MAX: u32 = 26_000_000;
/// External clock on OSC_IN, HSE bypass mode.
pub const HSE_BYPASS_MAX: u32 = 50_000_000;

pub const VCO_IN_MIN: u32 = 950_000;
pub const VCO_IN_MAX: u32 = 2_100_000;
pub const VCO_OUT_MIN: u32 = 100_000_000;
pub const VCO_OUT_MAX: u32 = 432_000_000;

/// With over-drive enabled. Without it, 168 MHz.
pub const SYSCLK_MAX: u32 = 180_000_000;
pub const HCLK_MAX: u32 = 180_000_000;
pub const APB1_MAX: u32 = 45_000_000;
pub const APB2_MAX: u32 = 90_000_000;

/// Default budget for each readiness poll: oscillator start, PLL lock, and clock switch.
pub const MAX_ITERS: u32 = 400_000;

/// This trait allows you to return information about a clocks's speeds.
/// It's used for configuring peripherals.
pub trait ClockCfg {
    /// System clock speed, in Hz.
    fn sysclk(&self) -> u32;

    /// HCLK speed, in Hz. Ie AHB bus, core, memory, and DMA.
    fn hclk(&self) -> u32;

    /// Cortex System timer speed, in Hz.
    fn systick(&self) -> u32;

    /// APB1 peripheral clocks speed, in Hz.
    fn apb1(&self) -> u32;

    /// APB1 timer clocks speed, in Hz.
    fn apb1_timer(&self) -> u32;

    /// APB2 peripheral clocks speed, in Hz.
    fn apb2(&self) -> u32;

    /// APB2 timer clocks speed, in Hz.
    fn apb2_timer(&self) -> u32;
}
