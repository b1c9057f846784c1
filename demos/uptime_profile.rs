//! Boards without the 32.768 kHz crystal: Timer/Counter2 uptime, the WDT as task
//! watchdog, and bounded busy waits instead of Power-save.

#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

use embedded_hal::digital::v2::ToggleableOutputPin;
use panic_halt as _;
use ufmt::uwriteln;

use atmega128_sleep_core::hal::{board, BusyDelay, NativeWatchdog, Power, ResetCause, Uart, UptimeClock};
use atmega128_sleep_core::platform::Clock;
use atmega128_sleep_core::rtos::{ActiveWait, PowerScheduler, SleepMethod};
use atmega128_sleep_core::{PowerConfig, WakeSlot, WatchdogTimeout};

const BLINK_PERIOD_MS: u64 = 1_500;

static TASKS: WakeSlot = WakeSlot::new();

#[avr_device::entry]
fn main() -> ! {
    let mut uart = Uart::new();
    uwriteln!(uart, "uptime profile, reset: {:?}", ResetCause::take()).ok();

    let clock = UptimeClock::start();
    let backend = ActiveWait::new(Power::new(), BusyDelay::new(clock));
    let config = PowerConfig::new().task_timeout(WatchdogTimeout::Ms2000);

    let mut scheduler = match PowerScheduler::new(&TASKS, clock, NativeWatchdog::new(), backend, config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            uwriteln!(uart, "power config rejected: {:?}", e).ok();
            #[allow(clippy::empty_loop)]
            loop {}
        }
    };
    scheduler.set_before_sleep_callback(announce_wait);

    let mut led = board::StatusLed::steal().into_output();

    // Enable interrupts globally
    unsafe { avr_device::interrupt::enable() };
    scheduler.start();
    TASKS.schedule_now();

    loop {
        let now = scheduler.clock().now_ms();
        if TASKS.take_due(now) {
            scheduler.run_task(|| {
                led.toggle().ok();
            });
            TASKS.schedule_at(now + BLINK_PERIOD_MS);
        }

        scheduler.on_idle();
    }
}

fn announce_wait(method: SleepMethod, duration_ms: u64) {
    let mut uart = Uart::new();
    uwriteln!(uart, "{:?} wait {} ms", method, duration_ms).ok();
}
