//! The clock controller handle.

use super::{
    ClockCfg, DEFAULT_HSE_FREQ, MAX_ITERS,
    config::{ClockConfig, SysclkSrc},
    freq::Clocks,
    regs::{Cfgr, ClockRegisters, Cr, Reg},
    switch,
};
use crate::error::Result;

/// Iteration budgets for the bounded readiness polls. Each poll gives up, with the matching
/// timeout error, after this many reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Retries {
    /// HSI / HSE ready flag, after enabling (or disabling) the oscillator.
    pub oscillator: u32,
    /// PLLRDY, after enabling (or disabling) the PLL.
    pub pll_lock: u32,
    /// SWS, after writing SW.
    pub clock_switch: u32,
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            oscillator: MAX_ITERS,
            pll_lock: MAX_ITERS,
            clock_switch: MAX_ITERS,
        }
    }
}

/// Board-level facts the registers can't tell us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RccSettings {
    /// Frequency of the crystal or external clock on OSC_IN, in Hz.
    pub hse_freq: u32,
    pub retries: Retries,
}

impl Default for RccSettings {
    fn default() -> Self {
        Self {
            hse_freq: DEFAULT_HSE_FREQ,
            retries: Retries::default(),
        }
    }
}

/// Owns the clock registers. Owning them is what keeps two switch sequences from interleaving;
/// give the registers back with `free`.
///
/// Frequencies are never cached: every getter reads the registers.
pub struct Rcc<R: ClockRegisters> {
    regs: R,
    settings: RccSettings,
}

impl<R: ClockRegisters> Rcc<R> {
    pub fn new(regs: R) -> Self {
        Self::with_settings(regs, RccSettings::default())
    }

    pub fn with_settings(regs: R, settings: RccSettings) -> Self {
        Self { regs, settings }
    }

    /// The HSE frequency and poll budgets this handle validates and switches with.
    pub fn settings(&self) -> &RccSettings {
        &self.settings
    }

    /// Borrow the register block, eg to inspect it without giving up the handle.
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Release the register block.
    pub fn free(self) -> R {
        self.regs
    }

    /// Validate `config`, then switch the clock tree over to it.
    ///
    /// A validation error (`InvalidParameter`, `PllRangeViolation`, `BusOverclock`) is returned
    /// before any register is written. A timeout leaves the device running on a valid
    /// configuration: the previous one, or HSI if the PLL failed to relock while SYSCLK was parked
    /// there. Call the frequency getters afterwards to see which.
    ///
    /// Code that can be interrupted by handlers relying on bus clocks should use
    /// `set_system_clock_masked` (feature `f446`), or otherwise keep them from running.
    pub fn set_system_clock(&mut self, config: &ClockConfig) -> Result<()> {
        let target = config.validate(self.settings.hse_freq).inspect_err(|e| {
            warn!("rcc: rejected clock config: {:?}", e);
        })?;

        switch::apply(&mut self.regs, target, self.settings.retries)
    }

    /// Frequencies of the running clock tree.
    pub fn clocks(&self) -> Clocks {
        Clocks::read(&self.regs, self.settings.hse_freq)
    }

    /// APB1 frequency, in Hz: the active source (per SWS) through the AHB and APB1 prescalers.
    /// Reserved prescaler encodings count as "not divided".
    pub fn peripheral_bus1_frequency(&self) -> u32 {
        self.clocks().apb1
    }

    /// APB2 frequency, in Hz. See `peripheral_bus1_frequency`.
    pub fn peripheral_bus2_frequency(&self) -> u32 {
        self.clocks().apb2
    }

    /// Main PLL output (P), in Hz. Zero unless the PLL is enabled and locked.
    pub fn pll_output_frequency(&self) -> u32 {
        self.clocks().pll_p
    }

    /// The source SWS reports as driving SYSCLK.
    pub fn active_source(&self) -> SysclkSrc {
        SysclkSrc::from_bits(Cfgr(self.regs.read(Reg::Cfgr)).sws())
    }

    /// Check if the PLL is enabled. This is useful if checking whether to re-apply the clock
    /// configuration after exiting Stop mode, where the system reverts to HSI, eg:
    /// ```ignore
    /// if !rcc.pll_is_enabled() {
    ///     rcc.set_system_clock(&clock_cfg)?;
    /// }
    /// ```
    pub fn pll_is_enabled(&self) -> bool {
        Cr(self.regs.read(Reg::Cr)).pllon()
    }
}

impl<R: ClockRegisters> ClockCfg for Rcc<R> {
    fn sysclk(&self) -> u32 {
        self.clocks().sysclk
    }

    fn hclk(&self) -> u32 {
        self.clocks().hclk
    }

    fn systick(&self) -> u32 {
        self.clocks().hclk
    }

    fn apb1(&self) -> u32 {
        self.peripheral_bus1_frequency()
    }

    fn apb1_timer(&self) -> u32 {
        self.clocks().apb1_timer
    }

    fn apb2(&self) -> u32 {
        self.peripheral_bus2_frequency()
    }

    fn apb2_timer(&self) -> u32 {
        self.clocks().apb2_timer
    }
}
