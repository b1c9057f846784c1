#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

use core::cell::Cell;

use avr_device::interrupt::{self, Mutex};
use embedded_hal::digital::v2::ToggleableOutputPin;
use panic_halt as _;
use ufmt::uwriteln;

use atmega128_sleep_core::hal::{
    self, board, ResetCause, RtcClock, RtcSleep, TimerWatchdog, Uart, SUPERVISION,
};
use atmega128_sleep_core::platform::Clock;
use atmega128_sleep_core::rtos::{HardwareSleep, MonotonicClock, PowerScheduler, SleepMethod};
use atmega128_sleep_core::{PowerConfig, WakeSlot};

// Long enough that the idle path picks Power-save between beats
const HEARTBEAT_PERIOD_MS: u64 = 20_000;

static TASKS: WakeSlot = WakeSlot::new();
static BUTTON_PRESSED: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));

#[avr_device::entry]
fn main() -> ! {
    let cause = ResetCause::take();
    let mut uart = Uart::new();
    uwriteln!(uart, "ATmega128 sleep core v0.1.0, reset: {:?}", cause).ok();

    let clock = MonotonicClock::new(RtcClock::start());
    let sleep = RtcSleep::new(clock.inner());
    let mut status = board::StatusLed::steal().into_output();
    let _button = board::WakeButton::steal().into_pull_up_input();
    hal::gpio::enable_int0_falling_edge();

    let config = PowerConfig::new().sleep_delay(50);
    let scheduler = PowerScheduler::new(
        &TASKS,
        clock,
        TimerWatchdog::new(),
        HardwareSleep::new(sleep),
        config,
    );
    let mut scheduler = match scheduler {
        Ok(scheduler) => scheduler.with_indicator(board::AwakeLed::steal().into_output()),
        Err(e) => {
            uwriteln!(uart, "power config rejected: {:?}", e).ok();
            #[allow(clippy::empty_loop)]
            loop {}
        }
    };
    scheduler.set_before_sleep_callback(announce_sleep);
    scheduler.set_supervision_callback(&SUPERVISION, report_hang);

    // Enable interrupts globally
    unsafe { avr_device::interrupt::enable() };
    scheduler.start();

    let mut next_heartbeat = scheduler.clock().now_ms();
    TASKS.schedule_at(next_heartbeat);

    loop {
        let now = scheduler.clock().now_ms();
        if TASKS.take_due(now) {
            let pressed = interrupt::free(|cs| BUTTON_PRESSED.borrow(cs).replace(false));
            if pressed {
                scheduler.run_task(|| {
                    uwriteln!(uart, "button at {} ms", now).ok();
                });
            }
            if now >= next_heartbeat {
                scheduler.run_task(|| {
                    status.toggle().ok();
                });
                next_heartbeat = now + HEARTBEAT_PERIOD_MS;
            }
            TASKS.schedule_at(next_heartbeat);
        }

        scheduler.on_idle();
    }
}

fn announce_sleep(method: SleepMethod, duration_ms: u64) {
    let mut uart = Uart::new();
    uwriteln!(uart, "sleep {:?} for {} ms", method, duration_ms).ok();
    // Power-save stops the USART clock mid-byte otherwise
    uart.flush();
}

fn report_hang() {
    let mut uart = Uart::new();
    uwriteln!(uart, "task hung, resetting").ok();
    uart.flush();
}

#[avr_device::interrupt(atmega128a)]
fn INT0() {
    interrupt::free(|cs| BUTTON_PRESSED.borrow(cs).set(true));
    TASKS.schedule_now();
}
