//! Moves the running clock tree from whatever the registers say now to a validated
//! configuration.
//!
//! Order of operations, each step relying on the one before it:
//!
//! 1. Start every oscillator the new configuration (or a temporary park on HSI) needs, and wait
//!    for its ready flag. Nothing that feeds SYSCLK is touched.
//! 2. Raise flash wait states and each bus prescaler to the slower of the old and new settings.
//!    From here on, every bus runs at or below both the old and the new rate, whichever source is
//!    selected.
//! 3. If the PLL has to be reprogrammed while it drives SYSCLK, switch SYSCLK to HSI first. Then
//!    stop the PLL, write PLLCFGR, restart it and wait for lock.
//! 4. Select the new source and wait for SWS to confirm it. This is the point of no return.
//! 5. Write the requested prescalers, then the requested wait states.
//! 6. Stop the oscillators the previous source used that are no longer needed. Best effort.
//!
//! Steps 1 - 3 are undone on failure as far as the hardware allows: oscillators started here
//! are stopped again, a half-configured PLL is stopped, and if SYSCLK is still on its original
//! source, the original prescalers and wait states are restored. A park on HSI is not undone.

use super::{
    config::{HseMode, SysclkSrc, Validated},
    regs::{Cfgr, ClockRegisters, Cr, FlashAcr, Pllcfgr, Reg},
    rcc::Retries,
};
use crate::{
    error::{Field, Oscillator, RccError, Result},
    util::bounded_loop,
};

/// Register contents before the first write.
#[derive(Clone, Copy, Debug)]
struct Snapshot {
    cr: Cr,
    pllcfgr: Pllcfgr,
    cfgr: Cfgr,
    acr: FlashAcr,
}

impl Snapshot {
    fn read<R: ClockRegisters + ?Sized>(regs: &R) -> Self {
        Self {
            cr: Cr(regs.read(Reg::Cr)),
            pllcfgr: Pllcfgr(regs.read(Reg::Pllcfgr)),
            cfgr: Cfgr(regs.read(Reg::Cfgr)),
            acr: FlashAcr(regs.read(Reg::FlashAcr)),
        }
    }

    fn source(&self) -> SysclkSrc {
        SysclkSrc::from_bits(self.cfgr.sws())
    }

    /// HSE drives SYSCLK, directly or through the PLL.
    fn hse_in_use(&self) -> bool {
        match self.source() {
            SysclkSrc::Hse => true,
            SysclkSrc::PllP | SysclkSrc::PllR => self.pllcfgr.pllsrc(),
            SysclkSrc::Hsi => false,
        }
    }

    fn hsi_in_use(&self) -> bool {
        match self.source() {
            SysclkSrc::Hsi => true,
            SysclkSrc::PllP | SysclkSrc::PllR => !self.pllcfgr.pllsrc(),
            SysclkSrc::Hse => false,
        }
    }
}

/// Oscillators this run switched on.
#[derive(Clone, Copy, Debug, Default)]
struct Started {
    hsi: bool,
    hse: bool,
}

/// Apply `target` to the hardware. Register state is expected to be consistent (no other code
/// touching these registers while this runs).
pub(crate) fn apply<R: ClockRegisters + ?Sized>(
    regs: &mut R,
    target: Validated,
    retries: Retries,
) -> Result<()> {
    let start = Snapshot::read(&*regs);

    // HSEBYP can only change with HSE stopped, which isn't possible while it drives SYSCLK.
    if let Some(mode) = hse_mode(&target) {
        if start.cr.hseon() && start.cr.hsebyp() != mode.bypass() && start.hse_in_use() {
            warn!("rcc: HSE is running SYSCLK in the other mode; refusing to restart it");
            return Err(RccError::InvalidParameter(Field::HseMode));
        }
    }

    Sequencer {
        regs,
        retries,
        target,
        start,
        started: Started::default(),
        pll_touched: false,
    }
    .run()
}

fn hse_mode(target: &Validated) -> Option<HseMode> {
    if target.config.uses_hse() {
        target.config.hse_mode
    } else {
        None
    }
}

struct Sequencer<'a, R: ClockRegisters + ?Sized> {
    regs: &'a mut R,
    retries: Retries,
    target: Validated,
    start: Snapshot,
    started: Started,
    pll_touched: bool,
}

impl<R: ClockRegisters + ?Sized> Sequencer<'_, R> {
    fn run(mut self) -> Result<()> {
        let old_src = self.start.source();
        let new_src = self.target.config.clock_source;
        let new_pllcfgr = self.target.pllcfgr(self.start.pllcfgr);

        let pll_reusable = self.start.cr.pllon()
            && self.start.cr.pllrdy()
            && self.start.pllcfgr.same_pll(new_pllcfgr);
        let park = old_src.is_pll() && self.target.config.uses_pll() && !pll_reusable;

        debug!(
            "rcc: switching SYSCLK {:?} -> {:?} ({} Hz)",
            old_src,
            new_src,
            self.target.sysclk
        );

        // 1
        if let Err(e) = self.start_oscillators(park || self.target.config.uses_hsi()) {
            return Err(self.fail(e));
        }

        // 2
        let acr = self.acr();
        let staged_acr = self.target.slower_wait_states(acr);
        if staged_acr != acr {
            self.write(Reg::FlashAcr, staged_acr.0);
        }
        let cfgr = self.cfgr();
        let staged = self.target.slower_prescalers(cfgr);
        if staged != cfgr {
            self.write(Reg::Cfgr, staged.0);
        }

        // 3
        if park {
            debug!("rcc: parking SYSCLK on HSI while the PLL is reprogrammed");
            if let Err(e) = self.switch_to(SysclkSrc::Hsi) {
                return Err(self.fail(e));
            }
        }
        if self.target.config.uses_pll() {
            // Re-checked: an HSE mode change in step 1 may have stopped an idle PLL.
            let cr = self.cr();
            let locked = cr.pllon() && cr.pllrdy() && self.pllcfgr().same_pll(new_pllcfgr);
            if !locked {
                if let Err(e) = self.restart_pll() {
                    return Err(self.fail(e));
                }
            }
        }

        // 4
        if SysclkSrc::from_bits(self.cfgr().sws()) != new_src {
            if let Err(e) = self.switch_to(new_src) {
                return Err(self.fail(e));
            }
        }

        // 5
        let cfgr = self.cfgr();
        let fin = self.target.prescalers(cfgr);
        if fin != cfgr {
            self.write(Reg::Cfgr, fin.0);
        }
        let acr = self.acr();
        let wanted = acr.set_latency(self.target.wait_states() as u8);
        if wanted != acr {
            self.write(Reg::FlashAcr, wanted.0);
        }

        let css = self.target.config.security_system && self.target.config.uses_hse();
        let cr = self.cr();
        if cr.csson() != css {
            self.write(Reg::Cr, cr.set_csson(css).0);
        }

        // 6
        self.release_unused(old_src);

        debug!("rcc: SYSCLK now {:?}", new_src);
        Ok(())
    }

    fn start_oscillators(&mut self, need_hsi: bool) -> Result<()> {
        if need_hsi {
            self.start_hsi()?;
        }
        if let Some(mode) = hse_mode(&self.target) {
            self.start_hse(mode)?;
        }
        Ok(())
    }

    fn start_hsi(&mut self) -> Result<()> {
        let cr = self.cr();
        if !cr.hsion() {
            debug!("rcc: starting HSI");
            self.write(Reg::Cr, cr.set_hsion(true).0);
            self.started.hsi = true;
        }
        self.poll_cr(
            self.retries.oscillator,
            RccError::OscillatorStartupTimeout(Oscillator::Hsi),
            |cr| cr.hsirdy(),
        )
    }

    fn start_hse(&mut self, mode: HseMode) -> Result<()> {
        let mut cr = self.cr();

        if cr.hseon() && cr.hsebyp() != mode.bypass() {
            // Running in the other mode, but not driving SYSCLK; that was checked up front.
            debug!("rcc: restarting HSE to change its mode to {:?}", mode);
            if cr.pllon() && self.pllcfgr().pllsrc() {
                self.pll_touched = true;
                self.write(Reg::Cr, cr.set_pllon(false).0);
                self.poll_cr(self.retries.pll_lock, RccError::PllLockTimeout, |cr| {
                    !cr.pllrdy()
                })?;
            }
            self.write(Reg::Cr, self.cr().set_hseon(false).0);
            self.poll_cr(
                self.retries.oscillator,
                RccError::OscillatorStartupTimeout(Oscillator::Hse),
                |cr| !cr.hserdy(),
            )?;
            cr = self.cr();
        }

        if !cr.hseon() {
            debug!("rcc: starting HSE, {:?}", mode);
            // HSEBYP is only writable while HSE is off.
            let cr = cr.set_hsebyp(mode.bypass());
            self.write(Reg::Cr, cr.0);
            self.write(Reg::Cr, cr.set_hseon(true).0);
            self.started.hse = true;
        }
        self.poll_cr(
            self.retries.oscillator,
            RccError::OscillatorStartupTimeout(Oscillator::Hse),
            |cr| cr.hserdy(),
        )
    }

    /// PLLCFGR may only be written with the PLL stopped.
    fn restart_pll(&mut self) -> Result<()> {
        self.pll_touched = true;

        let cr = self.cr();
        if cr.pllon() {
            self.write(Reg::Cr, cr.set_pllon(false).0);
            self.poll_cr(self.retries.pll_lock, RccError::PllLockTimeout, |cr| {
                !cr.pllrdy()
            })?;
        }

        let pllcfgr = self.target.pllcfgr(self.pllcfgr());
        debug!(
            "rcc: PLL M={} N={} P={} Q={} R={}",
            pllcfgr.pllm(),
            pllcfgr.plln(),
            self.target.pllp.value(),
            pllcfgr.pllq(),
            pllcfgr.pllr()
        );
        self.write(Reg::Pllcfgr, pllcfgr.0);
        self.write(Reg::Cr, self.cr().set_pllon(true).0);

        self.poll_cr(self.retries.pll_lock, RccError::PllLockTimeout, |cr| {
            cr.pllrdy()
        })
    }

    fn switch_to(&mut self, src: SysclkSrc) -> Result<()> {
        let cfgr = self.cfgr();
        self.write(Reg::Cfgr, cfgr.set_sw(src.bits()).0);

        let bits = src.bits();
        let result = self.poll_cfgr(self.retries.clock_switch, RccError::ClockSwitchTimeout, |c| {
            c.sws() == bits
        });
        if result.is_err() {
            // Point SW back at whatever is actually running.
            let cfgr = self.cfgr();
            self.write(Reg::Cfgr, cfgr.set_sw(cfgr.sws()).0);
        }
        result
    }

    /// Undo what can be undone around the source SWS reports, and hand back `e`.
    fn fail(&mut self, e: RccError) -> RccError {
        error!("rcc: clock switch failed: {:?}", e);

        let now = Snapshot::read(&*self.regs);
        let active = now.source();

        if self.pll_touched && !active.is_pll() && now.cr.pllon() {
            self.stop(|cr| cr.set_pllon(false), |cr| !cr.pllrdy(), "PLL");
        }

        if active == self.start.source() {
            let restored = now
                .cfgr
                .set_hpre(self.start.cfgr.hpre())
                .set_ppre1(self.start.cfgr.ppre1())
                .set_ppre2(self.start.cfgr.ppre2());
            if restored != now.cfgr {
                self.write(Reg::Cfgr, restored.0);
            }
            let acr = self.acr();
            let restored = acr.set_latency(self.start.acr.latency());
            if restored != acr {
                self.write(Reg::FlashAcr, restored.0);
            }
        }

        let now = Snapshot::read(&*self.regs);
        let pll_running = now.cr.pllon();
        if self.started.hse && !now.hse_in_use() && !(pll_running && now.pllcfgr.pllsrc()) {
            self.stop(|cr| cr.set_hseon(false), |cr| !cr.hserdy(), "HSE");
        }
        if self.started.hsi && !now.hsi_in_use() && !(pll_running && !now.pllcfgr.pllsrc()) {
            self.stop(|cr| cr.set_hsion(false), |cr| !cr.hsirdy(), "HSI");
        }

        e
    }

    /// Stop what fed the previous SYSCLK (and anything started only for the park on HSI) unless
    /// the new configuration uses it.
    fn release_unused(&mut self, old_src: SysclkSrc) {
        let c = self.target.config;
        let old_pll_hse = self.start.pllcfgr.pllsrc();

        let prev_hse = old_src == SysclkSrc::Hse || (old_src.is_pll() && old_pll_hse);
        let prev_hsi = old_src == SysclkSrc::Hsi || (old_src.is_pll() && !old_pll_hse);
        let drop_hse = (prev_hse || self.started.hse) && !c.uses_hse();
        let drop_hsi = (prev_hsi || self.started.hsi) && !c.uses_hsi();

        if !c.uses_pll() && self.cr().pllon() {
            // An idle PLL loses its input if that oscillator goes, so it goes first.
            let pll_hse = self.pllcfgr().pllsrc();
            if old_src.is_pll() || (pll_hse && drop_hse) || (!pll_hse && drop_hsi) {
                self.stop(|cr| cr.set_pllon(false), |cr| !cr.pllrdy(), "PLL");
            }
        }

        let pll_running = self.cr().pllon();
        let pll_hse = self.pllcfgr().pllsrc();
        if drop_hse && !(pll_running && pll_hse) {
            self.stop(|cr| cr.set_hseon(false), |cr| !cr.hserdy(), "HSE");
        }
        if drop_hsi && !(pll_running && !pll_hse) {
            self.stop(|cr| cr.set_hsion(false), |cr| !cr.hsirdy(), "HSI");
        }
    }

    /// Clear an enable bit and wait for its ready flag to drop. Only logs if it doesn't.
    fn stop(&mut self, off: fn(Cr) -> Cr, stopped: fn(Cr) -> bool, name: &'static str) {
        debug!("rcc: stopping {}", name);
        self.write(Reg::Cr, off(self.cr()).0);

        let mut i: u32 = 0;
        while !stopped(self.cr()) {
            i += 1;
            if i >= self.retries.oscillator {
                warn!("rcc: {} still reports ready after being disabled", name);
                return;
            }
        }
    }

    fn poll_cr(&self, budget: u32, err: RccError, done: impl Fn(Cr) -> bool) -> Result<()> {
        bounded_loop!(!done(self.cr()), budget, err);
        Ok(())
    }

    fn poll_cfgr(&self, budget: u32, err: RccError, done: impl Fn(Cfgr) -> bool) -> Result<()> {
        bounded_loop!(!done(self.cfgr()), budget, err);
        Ok(())
    }

    fn cr(&self) -> Cr {
        Cr(self.regs.read(Reg::Cr))
    }

    fn pllcfgr(&self) -> Pllcfgr {
        Pllcfgr(self.regs.read(Reg::Pllcfgr))
    }

    fn cfgr(&self) -> Cfgr {
        Cfgr(self.regs.read(Reg::Cfgr))
    }

    fn acr(&self) -> FlashAcr {
        FlashAcr(self.regs.read(Reg::FlashAcr))
    }

    fn write(&mut self, reg: Reg, value: u32) {
        trace!("rcc: {:?} <- {:#x}", reg, value);
        self.regs.write(reg, value);
    }
}
