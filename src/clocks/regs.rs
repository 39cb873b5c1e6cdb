//! The registers the clock tree touches, and typed views over their bit fields.
//!
//! Offsets and widths follow RM0390 (STM32F446), sections 6.3.1 - 6.3.3 and 3.8.1.

use crate::util::reg_fields;

/// A register the clock tree reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// RCC_CR, RCC + 0x00
    Cr,
    /// RCC_PLLCFGR, RCC + 0x04
    Pllcfgr,
    /// RCC_CFGR, RCC + 0x08
    Cfgr,
    /// FLASH_ACR, FLASH + 0x00
    FlashAcr,
}

/// Read/write access to the clock controller (and the flash access control register, whose
/// wait states must track HCLK).
///
/// This is the only way the rest of the crate reaches hardware. Implement it over the PAC (see
/// `PacRegisters` with the `f446` feature), or over a simulated register block in tests.
///
/// Implementors must not cache: every `read` returns the register's current contents,
/// including status bits that change on their own (HSERDY, PLLRDY, SWS, ...).
pub trait ClockRegisters {
    fn read(&self, reg: Reg) -> u32;

    fn write(&mut self, reg: Reg, value: u32);
}

impl<T: ClockRegisters + ?Sized> ClockRegisters for &mut T {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

/// RCC clock control register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cr(pub u32);

impl Cr {
    /// HSION | HSIRDY | HSITRIM = 16
    pub const RESET: Self = Self(0x0000_0083);
}

reg_fields!(Cr {
    /// Internal high-speed oscillator enable
    hsion: bool [0],
    hsirdy: bool [1],
    /// External high-speed oscillator enable
    hseon: bool [16],
    hserdy: bool [17],
    /// HSE clock bypass. Only writable while HSEON is clear.
    hsebyp: bool [18],
    /// Clock security system enable
    csson: bool [19],
    /// Main PLL enable
    pllon: bool [24],
    pllrdy: bool [25],
});

/// RCC PLL configuration register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pllcfgr(pub u32);

impl Pllcfgr {
    /// PLLR = 2, PLLQ = 4, PLLN = 192, PLLM = 16
    pub const RESET: Self = Self(0x2400_3010);

    /// Compare only the fields that shape the PLL outputs.
    pub const fn same_pll(self, other: Self) -> bool {
        const MASK: u32 = 0x7F43_7FFF;
        self.0 & MASK == other.0 & MASK
    }
}

reg_fields!(Pllcfgr {
    /// Division factor for the VCO input
    pllm: u8 [0, 6],
    /// Multiplication factor for the VCO
    plln: u16 [6, 9],
    /// Main output division factor, encoded. See `Pllp`.
    pllp: u8 [16, 2],
    /// Set for HSE, clear for HSI.
    pllsrc: bool [22],
    /// Division factor for the 48 MHz domain
    pllq: u8 [24, 4],
    /// Division factor for the second system clock candidate
    pllr: u8 [28, 3],
});

/// RCC clock configuration register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cfgr(pub u32);

impl Cfgr {
    pub const RESET: Self = Self(0);
}

reg_fields!(Cfgr {
    /// System clock switch
    sw: u8 [0, 2],
    /// System clock switch status. Read-only; lags `sw`.
    sws: u8 [2, 2],
    /// AHB prescaler, encoded. See `HclkPrescaler`.
    hpre: u8 [4, 4],
    /// APB1 (low-speed) prescaler, encoded. See `ApbPrescaler`.
    ppre1: u8 [10, 3],
    /// APB2 (high-speed) prescaler, encoded.
    ppre2: u8 [13, 3],
});

/// Flash access control register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashAcr(pub u32);

impl FlashAcr {
    pub const RESET: Self = Self(0);
}

reg_fields!(FlashAcr {
    /// Wait states
    latency: u8 [0, 4],
    prften: bool [8],
    icen: bool [9],
    dcen: bool [10],
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pllcfgr_reset_value_decodes() {
        let r = Pllcfgr::RESET;
        assert_eq!(r.pllm(), 16);
        assert_eq!(r.plln(), 192);
        assert_eq!(r.pllp(), 0);
        assert!(!r.pllsrc());
        assert_eq!(r.pllq(), 4);
        assert_eq!(r.pllr(), 2);
    }

    #[test]
    fn setters_only_touch_their_field() {
        let r = Pllcfgr(0xFFFF_FFFF).set_plln(0);
        assert_eq!(r.0, 0xFFFF_FFFF_u32 & !(0x1FF << 6));

        let r = Cfgr(0).set_ppre2(0b111).set_sw(0b10);
        assert_eq!(r.0, 0b111_u32 << 13 | 0b10);
        assert_eq!(r.sws(), 0);

        // Values wider than the field are truncated rather than spilling into neighbours.
        let r = Pllcfgr(0).set_pllm(0xFF);
        assert_eq!(r.0, 0x3F);
    }

    #[test]
    fn single_bits() {
        let cr = Cr(0).set_hseon(true).set_hsebyp(true);
        assert_eq!(cr.0, 1_u32 << 16 | 1 << 18);
        assert!(cr.hseon() && cr.hsebyp() && !cr.hserdy());
        assert_eq!(cr.set_hseon(false).0, 1_u32 << 18);
        assert!(Cr::RESET.hsion() && Cr::RESET.hsirdy());
    }

    #[test]
    fn same_pll_ignores_reserved_bits() {
        let a = Pllcfgr::RESET;
        assert!(a.same_pll(Pllcfgr(a.0 | 1_u32 << 31 | 1 << 15)));
        assert!(!a.same_pll(a.set_pllsrc(true)));
        assert!(!a.same_pll(a.set_pllr(3)));
    }
}
