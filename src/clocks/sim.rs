//! A simulated clock controller for host tests.
//!
//! Behaves like the F446 RCC where it matters to a switch sequence: ready flags follow their
//! enable bits after a few reads of CR, SWS follows SW after a few reads of CFGR (and only once
//! the selected source is ready), read-only bits ignore writes, and the oscillator or PLL driving
//! SYSCLK can't be stopped. Anything the sequence must never do is recorded as a violation
//! instead of panicking, so a test can assert on the whole run.

use core::cell::{Cell, RefCell};
use std::vec::Vec;

use super::{
    DEFAULT_HSE_FREQ, WaitState,
    config::SysclkSrc,
    freq::Clocks,
    regs::{Cfgr, ClockRegisters, Cr, FlashAcr, Pllcfgr, Reg},
};

#[derive(Clone, Copy, Debug, Default)]
struct Countdown {
    hsi: u32,
    hse: u32,
    pll: u32,
    sws: u32,
}

pub struct SimRegisters {
    cr: Cell<Cr>,
    pllcfgr: Pllcfgr,
    cfgr: Cell<Cfgr>,
    acr: FlashAcr,
    pub hse_freq: u32,
    /// CR reads before a ready flag follows its enable bit.
    pub settle_reads: u32,
    /// CFGR reads before SWS follows SW.
    pub switch_reads: u32,
    /// HSIRDY never sets.
    pub hsi_stuck: bool,
    /// HSERDY never sets; eg no crystal fitted.
    pub hse_stuck: bool,
    /// PLLRDY never sets.
    pub pll_stuck: bool,
    /// SWS ignores SW.
    pub sws_stuck: bool,
    /// Ready flags never clear once set.
    pub ready_stuck_on: bool,
    pub writes: Vec<(Reg, u32)>,
    countdown: Cell<Countdown>,
    cr_reads: Cell<u32>,
    samples: RefCell<Vec<Clocks>>,
    violations: RefCell<Vec<&'static str>>,
}

impl SimRegisters {
    /// Reset state: running from HSI, PLL off, no wait states.
    pub fn new() -> Self {
        Self {
            cr: Cell::new(Cr::RESET),
            pllcfgr: Pllcfgr::RESET,
            cfgr: Cell::new(Cfgr::RESET),
            acr: FlashAcr::RESET,
            hse_freq: DEFAULT_HSE_FREQ,
            settle_reads: 3,
            switch_reads: 2,
            hsi_stuck: false,
            hse_stuck: false,
            pll_stuck: false,
            sws_stuck: false,
            ready_stuck_on: false,
            writes: Vec::new(),
            countdown: Cell::new(Countdown::default()),
            cr_reads: Cell::new(0),
            samples: RefCell::new(Vec::new()),
            violations: RefCell::new(Vec::new()),
        }
    }

    /// Force a register's contents, status bits included, without logging a write.
    pub fn poke(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::Cr => self.cr.set(Cr(value)),
            Reg::Pllcfgr => self.pllcfgr = Pllcfgr(value),
            Reg::Cfgr => self.cfgr.set(Cfgr(value)),
            Reg::FlashAcr => self.acr = FlashAcr(value),
        }
    }

    /// Forget writes, samples, and read counts; keep register state and violations.
    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.samples.borrow_mut().clear();
        self.cr_reads.set(0);
    }

    pub fn cr(&self) -> Cr {
        self.cr.get()
    }

    pub fn pllcfgr(&self) -> Pllcfgr {
        self.pllcfgr
    }

    pub fn cfgr(&self) -> Cfgr {
        self.cfgr.get()
    }

    pub fn acr(&self) -> FlashAcr {
        self.acr
    }

    pub fn cr_reads(&self) -> u32 {
        self.cr_reads.get()
    }

    pub fn writes_to(&self, reg: Reg) -> usize {
        self.writes.iter().filter(|(r, _)| *r == reg).count()
    }

    /// Clock frequencies after every write, and after every change SWS or a ready flag made on
    /// its own.
    pub fn samples(&self) -> Vec<Clocks> {
        self.samples.borrow().clone()
    }

    pub fn violations(&self) -> Vec<&'static str> {
        self.violations.borrow().clone()
    }

    /// What the hardware is running at now. Doesn't advance the simulation.
    pub fn clocks(&self) -> Clocks {
        Clocks::from_registers(self.cr.get(), self.pllcfgr, self.cfgr.get(), self.hse_freq)
    }

    fn source(&self) -> SysclkSrc {
        SysclkSrc::from_bits(self.cfgr.get().sws())
    }

    fn hsi_feeds_sysclk(&self) -> bool {
        let src = self.source();
        src == SysclkSrc::Hsi || (src.is_pll() && !self.pllcfgr.pllsrc())
    }

    fn hse_feeds_sysclk(&self) -> bool {
        let src = self.source();
        src == SysclkSrc::Hse || (src.is_pll() && self.pllcfgr.pllsrc())
    }

    fn violation(&self, what: &'static str) {
        self.violations.borrow_mut().push(what);
    }

    fn sample(&self) {
        let clocks = self.clocks();
        if WaitState::for_hclk(clocks.hclk) as u8 > self.acr.latency() {
            self.violation("flash latency below what HCLK needs");
        }
        self.samples.borrow_mut().push(clocks);
    }

    /// Advance ready flags by one read of CR.
    fn tick_cr(&self) {
        let old = self.cr.get();
        let mut cd = self.countdown.get();

        let hsirdy = settle(
            &mut cd.hsi,
            old.hsion(),
            old.hsirdy(),
            self.hsi_stuck,
            self.ready_stuck_on,
        );
        let hserdy = settle(
            &mut cd.hse,
            old.hseon(),
            old.hserdy(),
            self.hse_stuck,
            self.ready_stuck_on,
        );
        let input_ready = if self.pllcfgr.pllsrc() { hserdy } else { hsirdy };
        let pllrdy = if old.pllrdy() && !input_ready && !self.ready_stuck_on {
            // Lost its reference.
            false
        } else {
            settle(
                &mut cd.pll,
                old.pllon() && input_ready,
                old.pllrdy(),
                self.pll_stuck,
                self.ready_stuck_on,
            )
        };

        self.countdown.set(cd);
        let new = old
            .set_hsirdy(hsirdy)
            .set_hserdy(hserdy)
            .set_pllrdy(pllrdy);
        if new != old {
            self.cr.set(new);
            self.sample();
        }
    }

    /// Advance SWS by one read of CFGR.
    fn tick_cfgr(&self) {
        let cfgr = self.cfgr.get();
        if cfgr.sw() == cfgr.sws() || self.sws_stuck {
            return;
        }
        let cr = self.cr.get();
        let ready = match SysclkSrc::from_bits(cfgr.sw()) {
            SysclkSrc::Hsi => cr.hsirdy(),
            SysclkSrc::Hse => cr.hserdy(),
            SysclkSrc::PllP | SysclkSrc::PllR => cr.pllrdy(),
        };
        if !ready {
            return;
        }

        let mut cd = self.countdown.get();
        if cd.sws > 0 {
            cd.sws -= 1;
            self.countdown.set(cd);
        } else {
            self.cfgr.set(cfgr.set_sws(cfgr.sw()));
            self.sample();
        }
    }

    fn write_cr(&mut self, value: Cr) {
        let old = self.cr.get();
        let mut new = value
            .set_hsirdy(old.hsirdy())
            .set_hserdy(old.hserdy())
            .set_pllrdy(old.pllrdy());

        if old.hseon() && new.hsebyp() != old.hsebyp() {
            self.violation("HSEBYP written while HSE runs");
            new = new.set_hsebyp(old.hsebyp());
        }
        if !new.hsion() && self.hsi_feeds_sysclk() {
            self.violation("tried to stop HSI while it drives SYSCLK");
            new = new.set_hsion(true);
        }
        if !new.hseon() && self.hse_feeds_sysclk() {
            self.violation("tried to stop HSE while it drives SYSCLK");
            new = new.set_hseon(true);
        }
        if !new.pllon() && self.source().is_pll() {
            self.violation("tried to stop the PLL while it drives SYSCLK");
            new = new.set_pllon(true);
        }

        let mut cd = self.countdown.get();
        if new.hsion() != old.hsion() {
            cd.hsi = self.settle_reads;
        }
        if new.hseon() != old.hseon() {
            cd.hse = self.settle_reads;
        }
        if new.pllon() != old.pllon() {
            cd.pll = self.settle_reads;
        }
        self.countdown.set(cd);
        self.cr.set(new);
    }

    fn write_cfgr(&mut self, value: Cfgr) {
        let old = self.cfgr.get();
        let new = value.set_sws(old.sws());
        if new.sw() != old.sw() {
            let mut cd = self.countdown.get();
            cd.sws = self.switch_reads;
            self.countdown.set(cd);
        }
        self.cfgr.set(new);
    }
}

/// Move a ready flag one read closer to its enable bit.
fn settle(count: &mut u32, on: bool, ready: bool, stuck_off: bool, stuck_on: bool) -> bool {
    if on == ready || (on && stuck_off) || (!on && stuck_on) {
        return ready;
    }
    if *count > 0 {
        *count -= 1;
        return ready;
    }
    on
}

impl ClockRegisters for SimRegisters {
    fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Cr => {
                self.cr_reads.set(self.cr_reads.get() + 1);
                self.tick_cr();
                self.cr.get().0
            }
            Reg::Pllcfgr => self.pllcfgr.0,
            Reg::Cfgr => {
                self.tick_cfgr();
                self.cfgr.get().0
            }
            Reg::FlashAcr => self.acr.0,
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.writes.push((reg, value));
        match reg {
            Reg::Cr => self.write_cr(Cr(value)),
            Reg::Pllcfgr => {
                let cr = self.cr.get();
                if cr.pllon() || cr.pllrdy() {
                    self.violation("PLLCFGR written while the PLL runs");
                }
                self.pllcfgr = Pllcfgr(value);
            }
            Reg::Cfgr => self.write_cfgr(Cfgr(value)),
            Reg::FlashAcr => self.acr = FlashAcr(value),
        }
        self.sample();
    }
}
