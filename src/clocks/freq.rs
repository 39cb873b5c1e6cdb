//! Frequency derivation. Everything here is pure: frequencies come from a configuration or from a
//! snapshot of register contents, in integer Hz, with every division truncating as the hardware
//! dividers do.

use super::{
    ClockCfg, HSI_FREQ,
    config::{ApbPrescaler, HclkPrescaler, PllSrc, Pllp, SysclkSrc, Validated},
    regs::{Cfgr, ClockRegisters, Cr, Pllcfgr, Reg},
};

/// `osc / m`. Zero for the reserved PLLM values 0 and 1.
pub const fn vco_input(osc: u32, pll_m: u8) -> u32 {
    if pll_m < 2 { 0 } else { osc / pll_m as u32 }
}

pub const fn vco_output(vco_in: u32, pll_n: u16) -> u32 {
    vco_in.saturating_mul(pll_n as u32)
}

/// `vco / div` for the PLL output dividers. Zero for the reserved values 0 and 1.
pub const fn divided(vco: u32, div: u8) -> u32 {
    if div < 2 { 0 } else { vco / div as u32 }
}

/// APB timer clocks run at twice the bus clock whenever the bus is divided.
const fn timer_clock(pclk: u32, pre: ApbPrescaler) -> u32 {
    match pre {
        ApbPrescaler::Div1 => pclk,
        _ => pclk * 2,
    }
}

/// Clock frequencies, in Hz. A snapshot: take a fresh one after changing the configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub sysclk: u32,
    /// AHB bus, core, memory, and DMA.
    pub hclk: u32,
    pub apb1: u32,
    pub apb2: u32,
    pub apb1_timer: u32,
    pub apb2_timer: u32,
    /// Main PLL output. Zero while the PLL is off or unlocked.
    pub pll_p: u32,
    /// 48 MHz domain PLL output. Zero while the PLL is off or unlocked.
    pub pll_q: u32,
    /// Second PLL output. Zero while the PLL is off or unlocked.
    pub pll_r: u32,
}

impl Clocks {
    /// The frequencies a validated configuration produces once applied.
    pub fn from_config(v: &Validated, hse_freq: u32) -> Self {
        let c = &v.config;
        let (pll_p, pll_q, pll_r) = if c.uses_pll() {
            let input = match c.pll_src {
                PllSrc::Hsi => HSI_FREQ,
                PllSrc::Hse => hse_freq,
            };
            let vco = vco_output(vco_input(input, c.pll_m), c.pll_n);
            (
                divided(vco, v.pllp.value()),
                divided(vco, c.pll_q),
                divided(vco, c.pll_r),
            )
        } else {
            (0, 0, 0)
        };

        Self::from_tree(v.sysclk, v.ahb, v.apb1, v.apb2, pll_p, pll_q, pll_r)
    }

    /// The frequencies the hardware is running at, given register contents. Every bit pattern
    /// gives a defined result:
    /// - the source is taken from SWS (what is running, not what was requested);
    /// - PLL outputs are zero unless PLLON and PLLRDY are both set, or when PLLM, PLLQ or
    ///   PLLR hold a reserved value below 2;
    /// - reserved HPRE / PPREx patterns count as "not divided", as the hardware treats them.
    pub fn from_registers(cr: Cr, pllcfgr: Pllcfgr, cfgr: Cfgr, hse_freq: u32) -> Self {
        let (pll_p, pll_q, pll_r) = if cr.pllon() && cr.pllrdy() {
            let input = if pllcfgr.pllsrc() { hse_freq } else { HSI_FREQ };
            let vco = vco_output(vco_input(input, pllcfgr.pllm()), pllcfgr.plln());
            (
                divided(vco, Pllp::from_bits(pllcfgr.pllp()).value()),
                divided(vco, pllcfgr.pllq()),
                divided(vco, pllcfgr.pllr()),
            )
        } else {
            (0, 0, 0)
        };

        let sysclk = match SysclkSrc::from_bits(cfgr.sws()) {
            SysclkSrc::Hsi => HSI_FREQ,
            SysclkSrc::Hse => hse_freq,
            SysclkSrc::PllP => pll_p,
            SysclkSrc::PllR => pll_r,
        };

        Self::from_tree(
            sysclk,
            HclkPrescaler::from_bits(cfgr.hpre()),
            ApbPrescaler::from_bits(cfgr.ppre1()),
            ApbPrescaler::from_bits(cfgr.ppre2()),
            pll_p,
            pll_q,
            pll_r,
        )
    }

    /// Read the registers and derive the running frequencies.
    pub fn read<R: ClockRegisters + ?Sized>(regs: &R, hse_freq: u32) -> Self {
        Self::from_registers(
            Cr(regs.read(Reg::Cr)),
            Pllcfgr(regs.read(Reg::Pllcfgr)),
            Cfgr(regs.read(Reg::Cfgr)),
            hse_freq,
        )
    }

    fn from_tree(
        sysclk: u32,
        ahb: HclkPrescaler,
        apb1: ApbPrescaler,
        apb2: ApbPrescaler,
        pll_p: u32,
        pll_q: u32,
        pll_r: u32,
    ) -> Self {
        let hclk = sysclk / ahb.value() as u32;
        let pclk1 = hclk / apb1.value() as u32;
        let pclk2 = hclk / apb2.value() as u32;

        Self {
            sysclk,
            hclk,
            apb1: pclk1,
            apb2: pclk2,
            apb1_timer: timer_clock(pclk1, apb1),
            apb2_timer: timer_clock(pclk2, apb2),
            pll_p,
            pll_q,
            pll_r,
        }
    }
}

impl ClockCfg for Clocks {
    fn sysclk(&self) -> u32 {
        self.sysclk
    }

    fn hclk(&self) -> u32 {
        self.hclk
    }

    fn systick(&self) -> u32 {
        self.hclk
    }

    fn apb1(&self) -> u32 {
        self.apb1
    }

    fn apb1_timer(&self) -> u32 {
        self.apb1_timer
    }

    fn apb2(&self) -> u32 {
        self.apb2
    }

    fn apb2_timer(&self) -> u32 {
        self.apb2_timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clocks::{ClockConfig, HseMode};

    fn pll_regs(m: u8, n: u16, p: Pllp, src_hse: bool) -> Pllcfgr {
        Pllcfgr::RESET
            .set_pllm(m)
            .set_plln(n)
            .set_pllp(p as u8)
            .set_pllsrc(src_hse)
    }

    const LOCKED: Cr = Cr(Cr::RESET.0 | 1 << 16 | 1 << 17 | 1 << 24 | 1 << 25);

    #[test]
    fn hse_8mhz_pll_chain() {
        let vco_in = vco_input(8_000_000, 8);
        assert_eq!(vco_in, 1_000_000);
        let vco_out = vco_output(vco_in, 360);
        assert_eq!(vco_out, 360_000_000);
        assert_eq!(divided(vco_out, Pllp::Div2.value()), 180_000_000);

        let cfgr = Cfgr::RESET.set_sws(SysclkSrc::PllP.bits());
        let clocks =
            Clocks::from_registers(LOCKED, pll_regs(8, 360, Pllp::Div2, true), cfgr, 8_000_000);
        assert_eq!(clocks.pll_p, 180_000_000);
        assert_eq!(clocks.sysclk, 180_000_000);
    }

    #[test]
    fn bus_chain_180mhz() {
        let cfgr = Cfgr::RESET
            .set_sws(SysclkSrc::PllP.bits())
            .set_hpre(HclkPrescaler::Div1 as u8)
            .set_ppre1(ApbPrescaler::Div4 as u8)
            .set_ppre2(ApbPrescaler::Div2 as u8);
        let clocks =
            Clocks::from_registers(LOCKED, pll_regs(8, 360, Pllp::Div2, true), cfgr, 8_000_000);
        assert_eq!(clocks.hclk, 180_000_000);
        assert_eq!(clocks.apb1, 45_000_000);
        assert_eq!(clocks.apb2, 90_000_000);
        assert_eq!(clocks.apb1_timer, 90_000_000);
        assert_eq!(clocks.apb2_timer, 180_000_000);
    }

    #[test]
    fn pll_output_zero_unless_locked() {
        let pll = pll_regs(8, 180, Pllp::Div2, false);
        let on_not_locked = Cr(Cr::RESET.0 | 1 << 24);
        let locked_flag_only = Cr(Cr::RESET.0 | 1 << 25);
        for cr in [Cr::RESET, on_not_locked, locked_flag_only] {
            let clocks = Clocks::from_registers(cr, pll, Cfgr::RESET, 8_000_000);
            assert_eq!(clocks.pll_p, 0);
            assert_eq!(clocks.pll_q, 0);
            assert_eq!(clocks.pll_r, 0);
            assert_eq!(clocks.sysclk, HSI_FREQ);
        }
    }

    #[test]
    fn reserved_pll_fields_do_not_divide_by_zero() {
        let pll = Pllcfgr(0);
        let cfgr = Cfgr::RESET.set_sws(SysclkSrc::PllR.bits());
        let clocks = Clocks::from_registers(LOCKED, pll, cfgr, 8_000_000);
        assert_eq!(clocks, Clocks::default());
    }

    #[test]
    fn every_cfgr_pattern_is_defined() {
        // Exhaust SWS, HPRE and PPRE1 bits; none may panic, and APB1 never exceeds HCLK.
        let pll = pll_regs(8, 180, Pllp::Div2, false);
        for sws in 0..4u8 {
            for hpre in 0..16u8 {
                for ppre1 in 0..8u8 {
                    let cfgr = Cfgr::RESET.set_sws(sws).set_hpre(hpre).set_ppre1(ppre1);
                    let clocks = Clocks::from_registers(LOCKED, pll, cfgr, 8_000_000);
                    assert!(clocks.apb1 <= clocks.hclk);
                    assert!(clocks.hclk <= clocks.sysclk);
                }
            }
        }
    }

    #[test]
    fn config_and_registers_agree() {
        let cfg = ClockConfig {
            hse_mode: Some(HseMode::Bypass),
            pll_src: PllSrc::Hse,
            pll_m: 4,
            pll_n: 168,
            pll_q: 7,
            ..Default::default()
        };
        let v = cfg.validate(8_000_000).unwrap();
        let expected = Clocks::from_config(&v, 8_000_000);
        assert_eq!(expected.sysclk, 168_000_000);
        assert_eq!(expected.pll_q, 48_000_000);

        let cfgr = v.prescalers(Cfgr::RESET).set_sws(SysclkSrc::PllP.bits());
        let live = Clocks::from_registers(LOCKED, v.pllcfgr(Pllcfgr::RESET), cfgr, 8_000_000);
        assert_eq!(live, expected);
    }
}
