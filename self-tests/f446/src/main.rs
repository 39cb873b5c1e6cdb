//! Steps a Nucleo-F446RE through a few clock configurations, printing the frequencies the
//! hardware reports after each switch. Uses the ST-LINK's 8 MHz MCO output as HSE, in bypass mode.

#![deny(warnings)]
#![no_std]
#![no_main]

use cortex_m::delay::Delay;
use cortex_m_rt::entry; // The runtime

use hal::{
    ClockCfg,
    clocks::{ClockConfig, HseMode, PacRegisters, PllSrc, Rcc},
    pac,
};

// Import the panic handler
use panic_probe as _;

/// 180 MHz needs the regulator's over-drive mode; RM0390 section 5.1.4.
fn enable_over_drive(rcc: &pac::RCC, pwr: &pac::PWR) {
    rcc.apb1enr().modify(|_, w| w.pwren().set_bit());
    pwr.cr().modify(|_, w| w.oden().set_bit());
    while pwr.csr().read().odrdy().bit_is_clear() {}
    pwr.cr().modify(|_, w| w.odswen().set_bit());
    while pwr.csr().read().odswrdy().bit_is_clear() {}
}

#[entry]
fn main() -> ! {
    rtt_target::rtt_init_defmt!();
    // Set up CPU peripherals
    let cp = cortex_m::Peripherals::take().unwrap();
    // Set up microcontroller peripherals
    let dp = pac::Peripherals::take().unwrap();

    enable_over_drive(&dp.RCC, &dp.PWR);

    let mut rcc = Rcc::new(PacRegisters::new(dp.RCC, dp.FLASH));

    let configs = [
        ("HSI PLL, 180 MHz", ClockConfig::default()),
        (
            "HSE PLL, 168 MHz, 48 MHz on Q",
            ClockConfig {
                hse_mode: Some(HseMode::Bypass),
                pll_src: PllSrc::Hse,
                pll_m: 4,
                pll_n: 168,
                pll_q: 7,
                ..Default::default()
            },
        ),
        ("HSE direct", ClockConfig::hse(HseMode::Bypass)),
        ("HSI direct", ClockConfig::hsi()),
    ];

    // Write the clock configuration to the MCU once, so the delay below has a known base.
    rcc.set_system_clock(&configs[0].1).unwrap();
    let mut delay = Delay::new(cp.SYST, rcc.systick());

    loop {
        for (name, cfg) in &configs {
            match rcc.set_system_clock_masked(cfg) {
                Ok(()) => defmt::println!("{}: {}", name, rcc.clocks()),
                Err(e) => defmt::println!("{}: {}", name, e),
            }
            // The delay counts core cycles, so it follows HCLK.
            delay = Delay::new(delay.free(), rcc.systick());
            delay.delay_ms(2_000);
        }
    }
}

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
