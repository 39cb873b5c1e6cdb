//! `ClockRegisters` over the device's RCC and FLASH peripherals.

use cortex_m::interrupt;

use super::{
    config::ClockConfig,
    rcc::Rcc,
    regs::{ClockRegisters, Reg},
};
use crate::{
    error::Result,
    pac::{FLASH, RCC},
};

/// The real register block. Takes the PAC singletons, so only one can exist.
pub struct PacRegisters {
    rcc: RCC,
    flash: FLASH,
}

impl PacRegisters {
    pub fn new(rcc: RCC, flash: FLASH) -> Self {
        Self { rcc, flash }
    }

    /// Give the peripherals back.
    pub fn free(self) -> (RCC, FLASH) {
        (self.rcc, self.flash)
    }
}

impl ClockRegisters for PacRegisters {
    fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Cr => self.rcc.cr().read().bits(),
            Reg::Pllcfgr => self.rcc.pllcfgr().read().bits(),
            Reg::Cfgr => self.rcc.cfgr().read().bits(),
            Reg::FlashAcr => self.flash.acr().read().bits(),
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        // Callers pass whole-register values built from a fresh read.
        match reg {
            Reg::Cr => {
                self.rcc.cr().write(|w| unsafe { w.bits(value) });
            }
            Reg::Pllcfgr => {
                self.rcc.pllcfgr().write(|w| unsafe { w.bits(value) });
            }
            Reg::Cfgr => {
                self.rcc.cfgr().write(|w| unsafe { w.bits(value) });
            }
            Reg::FlashAcr => {
                self.flash.acr().write(|w| unsafe { w.bits(value) });
            }
        }
    }
}

impl<R: ClockRegisters> Rcc<R> {
    /// `set_system_clock` with interrupts masked, so no handler observes the clock tree halfway
    /// through a switch.
    pub fn set_system_clock_masked(&mut self, config: &ClockConfig) -> Result<()> {
        interrupt::free(|_| self.set_system_clock(config))
    }
}
