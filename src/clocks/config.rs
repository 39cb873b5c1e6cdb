//! Clock configuration values, and the checks that run before any register is touched.

use super::{
    APB1_MAX, APB2_MAX, HCLK_MAX, HSE_BYPASS_MAX, HSE_CRYSTAL_MAX, HSE_CRYSTAL_MIN, HSI_FREQ,
    SYSCLK_MAX, VCO_IN_MAX, VCO_IN_MIN, VCO_OUT_MAX, VCO_OUT_MIN, freq,
    regs::{Cfgr, FlashAcr, Pllcfgr},
};
use crate::error::{Bus, Field, PllStage, RccError, Result};

/// The system clock source. The discriminant is the SW / SWS encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SysclkSrc {
    Hsi = 0b00,
    Hse = 0b01,
    /// Main PLL output
    PllP = 0b10,
    /// Second PLL output
    PllR = 0b11,
}

impl SysclkSrc {
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Every 2-bit pattern is a valid source, so this is total.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Hsi,
            0b01 => Self::Hse,
            0b10 => Self::PllP,
            _ => Self::PllR,
        }
    }

    pub const fn is_pll(self) -> bool {
        matches!(self, Self::PllP | Self::PllR)
    }
}

/// The clocks source input used by the PLL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllSrc {
    Hsi,
    Hse,
}

impl PllSrc {
    /// PLLSRC bit
    pub const fn bit(self) -> bool {
        matches!(self, Self::Hse)
    }
}

/// How the external high-speed oscillator is driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HseMode {
    /// An external clock signal on OSC_IN; the oscillator amplifier is bypassed. Eg the 8 MHz
    /// MCO output of an ST-LINK on Nucleo boards.
    Bypass,
    /// A crystal or ceramic resonator between OSC_IN and OSC_OUT.
    Crystal,
}

impl HseMode {
    /// HSEBYP bit
    pub const fn bypass(self) -> bool {
        matches!(self, Self::Bypass)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Main PLL division factor (PLLP).
pub enum Pllp {
    Div2 = 0b00,
    Div4 = 0b01,
    Div6 = 0b10,
    Div8 = 0b11,
}

impl Pllp {
    pub const fn value(&self) -> u8 {
        match self {
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div6 => 6,
            Self::Div8 => 8,
        }
    }

    pub const fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            2 => Self::Div2,
            4 => Self::Div4,
            6 => Self::Div6,
            8 => Self::Div8,
            _ => return None,
        })
    }

    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Div2,
            0b01 => Self::Div4,
            0b10 => Self::Div6,
            _ => Self::Div8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Division factor for the AHB clock. Also known as AHB Prescaler.
pub enum HclkPrescaler {
    Div1 = 0b0000,
    Div2 = 0b1000,
    Div4 = 0b1001,
    Div8 = 0b1010,
    Div16 = 0b1011,
    Div64 = 0b1100,
    Div128 = 0b1101,
    Div256 = 0b1110,
    Div512 = 0b1111,
}

impl HclkPrescaler {
    pub const fn value(&self) -> u16 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div64 => 64,
            Self::Div128 => 128,
            Self::Div256 => 256,
            Self::Div512 => 512,
        }
    }

    /// There's no /32 on this part.
    pub const fn from_value(value: u16) -> Option<Self> {
        Some(match value {
            1 => Self::Div1,
            2 => Self::Div2,
            4 => Self::Div4,
            8 => Self::Div8,
            16 => Self::Div16,
            64 => Self::Div64,
            128 => Self::Div128,
            256 => Self::Div256,
            512 => Self::Div512,
            _ => return None,
        })
    }

    /// Decode HPRE. Every `0xxx` pattern means "not divided", as the hardware treats it.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b1111 {
            0b1000 => Self::Div2,
            0b1001 => Self::Div4,
            0b1010 => Self::Div8,
            0b1011 => Self::Div16,
            0b1100 => Self::Div64,
            0b1101 => Self::Div128,
            0b1110 => Self::Div256,
            0b1111 => Self::Div512,
            _ => Self::Div1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// For use with `RCC_APBPPRE1`, and `RCC_APBPPRE2`. Ie, low-speed and high-speed prescalers respectively.
pub enum ApbPrescaler {
    Div1 = 0b000,
    Div2 = 0b100,
    Div4 = 0b101,
    Div8 = 0b110,
    Div16 = 0b111,
}

impl ApbPrescaler {
    pub const fn value(&self) -> u8 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
        }
    }

    pub const fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Div1,
            2 => Self::Div2,
            4 => Self::Div4,
            8 => Self::Div8,
            16 => Self::Div16,
            _ => return None,
        })
    }

    /// Decode PPREx. Every `0xx` pattern means "not divided".
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b100 => Self::Div2,
            0b101 => Self::Div4,
            0b110 => Self::Div8,
            0b111 => Self::Div16,
            _ => Self::Div1,
        }
    }
}

/// Flash wait states, RM0390 table 5 (2.7 - 3.6 V supply).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WaitState {
    W0 = 0,
    W1 = 1,
    W2 = 2,
    W3 = 3,
    W4 = 4,
    W5 = 5,
}

impl WaitState {
    pub const fn for_hclk(hclk: u32) -> Self {
        if hclk <= 30_000_000 {
            Self::W0
        } else if hclk <= 60_000_000 {
            Self::W1
        } else if hclk <= 90_000_000 {
            Self::W2
        } else if hclk <= 120_000_000 {
            Self::W3
        } else if hclk <= 150_000_000 {
            Self::W4
        } else {
            Self::W5
        }
    }
}

/// Settings used to configure clocks. Create this struct by using its `Default::default()`
/// implementation or one of the presets, then modify as required, referencing RM0390's clock
/// tree or STM32CubeIDE's clock configuration tab. Apply it with `Rcc::set_system_clock`.
///
/// Dividers are plain division factors (eg `apb1_divider: 4`); they are checked against the
/// values the hardware can encode when the config is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    /// The input source for the system and peripheral clocks. Eg HSE, HSI, PLL etc
    pub clock_source: SysclkSrc,
    /// Required whenever HSE is used, directly or as the PLL input.
    pub hse_mode: Option<HseMode>,
    /// The value to divide SYSCLK by, to get HCLK. 1, 2, 4, 8, 16, 64, 128, 256 or 512.
    pub ahb_divider: u16,
    /// The divider of HCLK to get the APB1 peripheral clock. 1, 2, 4, 8 or 16.
    pub apb1_divider: u8,
    /// The divider of HCLK to get the APB2 peripheral clock. 1, 2, 4, 8 or 16.
    pub apb2_divider: u8,
    pub pll_src: PllSrc,
    /// 2 ..= 63
    pub pll_m: u8,
    /// 50 ..= 432
    pub pll_n: u16,
    /// 2, 4, 6 or 8
    pub pll_p: u8,
    /// 2 ..= 15. Feeds the 48 MHz domain (USB, SDIO).
    pub pll_q: u8,
    /// 2 ..= 7
    pub pll_r: u8,
    /// Enable the clock security system while HSE is in use.
    pub security_system: bool,
}

impl Default for ClockConfig {
    /// This preset configures clocks with a HSI-fed PLL and the maximum rated speeds:
    /// SYSCLK and HCLK 180 MHz, APB1 45 MHz, APB2 90 MHz. Not valid for USB.
    fn default() -> Self {
        Self {
            clock_source: SysclkSrc::PllP,
            hse_mode: None,
            ahb_divider: 1,
            apb1_divider: 4,
            apb2_divider: 2,
            pll_src: PllSrc::Hsi,
            pll_m: 8,
            pll_n: 180,
            pll_p: 2,
            pll_q: 8, // Note that this produces an invalid USB speed.
            pll_r: 2,
            security_system: false,
        }
    }
}

impl ClockConfig {
    /// Run straight from the 16 MHz HSI, undivided. This is the reset state.
    pub fn hsi() -> Self {
        Self {
            clock_source: SysclkSrc::Hsi,
            apb1_divider: 1,
            apb2_divider: 1,
            ..Default::default()
        }
    }

    /// Run straight from the HSE, undivided.
    pub fn hse(mode: HseMode) -> Self {
        Self {
            clock_source: SysclkSrc::Hse,
            hse_mode: Some(mode),
            apb1_divider: 1,
            apb2_divider: 1,
            ..Default::default()
        }
    }

    pub const fn uses_pll(&self) -> bool {
        self.clock_source.is_pll()
    }

    pub const fn uses_hse(&self) -> bool {
        matches!(self.clock_source, SysclkSrc::Hse)
            || (self.uses_pll() && matches!(self.pll_src, PllSrc::Hse))
    }

    pub const fn uses_hsi(&self) -> bool {
        matches!(self.clock_source, SysclkSrc::Hsi)
            || (self.uses_pll() && matches!(self.pll_src, PllSrc::Hsi))
    }

    /// Check every field, then the derived PLL and bus frequencies. `hse_freq` is the board's
    /// HSE frequency, in Hz. Reads no registers.
    pub fn validate(&self, hse_freq: u32) -> Result<Validated> {
        let ahb = HclkPrescaler::from_value(self.ahb_divider)
            .ok_or(RccError::InvalidParameter(Field::AhbDivider))?;
        let apb1 = ApbPrescaler::from_value(self.apb1_divider)
            .ok_or(RccError::InvalidParameter(Field::Apb1Divider))?;
        let apb2 = ApbPrescaler::from_value(self.apb2_divider)
            .ok_or(RccError::InvalidParameter(Field::Apb2Divider))?;
        let pllp =
            Pllp::from_value(self.pll_p).ok_or(RccError::InvalidParameter(Field::PllP))?;

        check_range(self.pll_m as u32, 2, 63, Field::PllM)?;
        check_range(self.pll_n as u32, 50, 432, Field::PllN)?;
        check_range(self.pll_q as u32, 2, 15, Field::PllQ)?;
        check_range(self.pll_r as u32, 2, 7, Field::PllR)?;

        let hse_wanted = matches!(self.clock_source, SysclkSrc::Hse)
            || matches!(self.pll_src, PllSrc::Hse);
        if hse_wanted {
            match self.hse_mode {
                None => return Err(RccError::InvalidParameter(Field::HseMode)),
                Some(HseMode::Crystal) => {
                    check_range(hse_freq, HSE_CRYSTAL_MIN, HSE_CRYSTAL_MAX, Field::HseFrequency)?
                }
                Some(HseMode::Bypass) => {
                    check_range(hse_freq, 1, HSE_BYPASS_MAX, Field::HseFrequency)?
                }
            }
        }

        let pll_input = match self.pll_src {
            PllSrc::Hsi => HSI_FREQ,
            PllSrc::Hse => hse_freq,
        };
        let vco_in = freq::vco_input(pll_input, self.pll_m);
        let vco_out = freq::vco_output(vco_in, self.pll_n);

        if self.uses_pll() {
            if !(VCO_IN_MIN..=VCO_IN_MAX).contains(&vco_in) {
                return Err(RccError::PllRangeViolation(PllStage::VcoInput));
            }
            if !(VCO_OUT_MIN..=VCO_OUT_MAX).contains(&vco_out) {
                return Err(RccError::PllRangeViolation(PllStage::VcoOutput));
            }
        }

        let sysclk = match self.clock_source {
            SysclkSrc::Hsi => HSI_FREQ,
            SysclkSrc::Hse => hse_freq,
            SysclkSrc::PllP => freq::divided(vco_out, pllp.value()),
            SysclkSrc::PllR => freq::divided(vco_out, self.pll_r),
        };
        let hclk = sysclk / ahb.value() as u32;
        let pclk1 = hclk / apb1.value() as u32;
        let pclk2 = hclk / apb2.value() as u32;

        if sysclk > SYSCLK_MAX {
            return Err(RccError::BusOverclock(Bus::Sysclk));
        }
        if hclk > HCLK_MAX {
            return Err(RccError::BusOverclock(Bus::Ahb));
        }
        if pclk1 > APB1_MAX {
            return Err(RccError::BusOverclock(Bus::Apb1));
        }
        if pclk2 > APB2_MAX {
            return Err(RccError::BusOverclock(Bus::Apb2));
        }

        Ok(Validated {
            config: *self,
            ahb,
            apb1,
            apb2,
            pllp,
            sysclk,
            hclk,
        })
    }
}

fn check_range(value: u32, min: u32, max: u32, field: Field) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RccError::InvalidParameter(field))
    }
}

/// A `ClockConfig` that passed `validate`, with its dividers in register encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validated {
    pub config: ClockConfig,
    pub ahb: HclkPrescaler,
    pub apb1: ApbPrescaler,
    pub apb2: ApbPrescaler,
    pub pllp: Pllp,
    pub sysclk: u32,
    pub hclk: u32,
}

impl Validated {
    /// PLLCFGR contents for this config, keeping `base`'s reserved bits.
    pub fn pllcfgr(&self, base: Pllcfgr) -> Pllcfgr {
        let c = &self.config;
        base.set_pllm(c.pll_m)
            .set_plln(c.pll_n)
            .set_pllp(self.pllp as u8)
            .set_pllsrc(c.pll_src.bit())
            .set_pllq(c.pll_q)
            .set_pllr(c.pll_r)
    }

    /// CFGR with this config's prescalers. SW is left as in `base`.
    pub fn prescalers(&self, base: Cfgr) -> Cfgr {
        base.set_hpre(self.ahb as u8)
            .set_ppre1(self.apb1 as u8)
            .set_ppre2(self.apb2 as u8)
    }

    pub fn wait_states(&self) -> WaitState {
        WaitState::for_hclk(self.hclk)
    }

    /// For each prescaler, the larger division of `current` and this config. With these in
    /// place, the bus clocks stay at or below both the old and the new configuration's, whichever
    /// source is selected.
    pub fn slower_prescalers(&self, current: Cfgr) -> Cfgr {
        let hpre = HclkPrescaler::from_bits(current.hpre());
        let ppre1 = ApbPrescaler::from_bits(current.ppre1());
        let ppre2 = ApbPrescaler::from_bits(current.ppre2());

        let hpre = if hpre.value() > self.ahb.value() { hpre } else { self.ahb };
        let ppre1 = if ppre1.value() > self.apb1.value() { ppre1 } else { self.apb1 };
        let ppre2 = if ppre2.value() > self.apb2.value() { ppre2 } else { self.apb2 };

        current
            .set_hpre(hpre as u8)
            .set_ppre1(ppre1 as u8)
            .set_ppre2(ppre2 as u8)
    }

    /// The larger of the current and required wait states.
    pub fn slower_wait_states(&self, current: FlashAcr) -> FlashAcr {
        let wanted = self.wait_states() as u8;
        if current.latency() >= wanted {
            current
        } else {
            current.set_latency(wanted)
        }
    }
}
