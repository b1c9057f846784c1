//! Task watchdog backends and the reset path
//!
//! [`TimerWatchdog`] counts milliseconds on Timer/Counter1 and hands expiry to
//! [`SUPERVISION`], so the supervision callback runs before the reset.
//! [`NativeWatchdog`] uses the WDT directly; it resets without an interrupt and
//! cannot run a callback.

use core::cell::Cell;

use avr_device::atmega128a::{TC1, WDT};
use avr_device::interrupt::{self, Mutex};

use crate::platform::{SystemReset, WatchdogTimer};
use crate::rtos::{SupervisionHook, WatchdogTimeout};

// WDTCR
const WDCE: u8 = 1 << 4;
const WDE: u8 = 1 << 3;
const WDP_MASK: u8 = 0b111;

// TCCR1B: CTC on OCR1A, CS12:0 = 011 (/64)
const WGM12: u8 = 1 << 3;
const CS1_DIV64: u8 = 0b011;
// TIMSK
const OCIE1A: u8 = 1 << 4;
const OCR1A_1MS: u16 = 249;

/// Nominal WDT periods at 5V for WDP2:0 = 0..=7.
const WDT_PERIODS_MS: [u64; 8] = [16, 32, 65, 130, 260, 520, 1000, 2100];

/// Supervision callback and budget used when the task watchdog expires.
pub static SUPERVISION: SupervisionHook = SupervisionHook::new();

/// Smallest prescaler covering `duration_ms`; longer requests get the longest.
fn prescaler_for(duration_ms: u64) -> u8 {
    WDT_PERIODS_MS
        .iter()
        .position(|&period| period >= duration_ms)
        .unwrap_or(WDT_PERIODS_MS.len() - 1) as u8
}

fn wdt_start(prescaler: u8) {
    interrupt::free(|_| unsafe {
        let p = WDT::ptr();
        avr_device::asm::wdr();
        // Timed sequence: change enable, then the new setting within four cycles
        (*p).wdtcr.write(|w| w.bits(WDCE | WDE));
        (*p).wdtcr.write(|w| w.bits(WDE | (prescaler & WDP_MASK)));
    });
}

fn wdt_stop() {
    interrupt::free(|_| unsafe {
        let p = WDT::ptr();
        avr_device::asm::wdr();
        (*p).wdtcr.write(|w| w.bits(WDCE | WDE));
        (*p).wdtcr.write(|w| w.bits(0x00));
    });
}

/// Resets through the WDT.
pub struct AvrReset {
    _private: (),
}

impl AvrReset {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for AvrReset {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemReset for AvrReset {
    fn arm_failsafe(&mut self, timeout: WatchdogTimeout) {
        let budget = timeout.duration_ms().unwrap_or(u64::MAX);
        wdt_start(prescaler_for(budget));
    }

    fn force_reset(&mut self) -> ! {
        interrupt::disable();
        wdt_start(0);
        loop {}
    }
}

pub struct NativeHandle(());

/// The WDT as task watchdog.
///
/// The hardware tops out near 2.1 s, so 4 s and 8 s selections run with the
/// longest period.
pub struct NativeWatchdog {
    _private: (),
}

impl NativeWatchdog {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for NativeWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchdogTimer for NativeWatchdog {
    type Handle = NativeHandle;

    fn create(&mut self) -> NativeHandle {
        NativeHandle(())
    }

    fn arm(&mut self, _handle: &mut NativeHandle, duration_ms: u64) {
        wdt_start(prescaler_for(duration_ms));
    }

    fn feed(&mut self, _handle: &mut NativeHandle) {
        avr_device::asm::wdr();
    }

    fn release(&mut self, _handle: NativeHandle) {
        wdt_stop();
    }

    fn service(&mut self) {
        // with the WDTON fuse programmed the WDT keeps running after release
        avr_device::asm::wdr();
    }
}

#[derive(Clone, Copy)]
struct Countdown {
    remaining_ms: u32,
    period_ms: u32,
}

static COUNTDOWN: Mutex<Cell<Option<Countdown>>> = Mutex::new(Cell::new(None));

pub struct TimerHandle(());

/// Software countdown on the Timer/Counter1 1ms compare interrupt.
pub struct TimerWatchdog {
    _private: (),
}

impl TimerWatchdog {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for TimerWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchdogTimer for TimerWatchdog {
    type Handle = TimerHandle;

    fn create(&mut self) -> TimerHandle {
        interrupt::free(|cs| unsafe {
            let p = TC1::ptr();
            (*p).tccr1a.write(|w| w.bits(0));
            (*p).tccr1b.write(|w| w.bits(WGM12));
            (*p).ocr1a.write(|w| w.bits(OCR1A_1MS));
            COUNTDOWN.borrow(cs).set(None);
        });
        TimerHandle(())
    }

    fn arm(&mut self, _handle: &mut TimerHandle, duration_ms: u64) {
        let period_ms = u32::try_from(duration_ms).unwrap_or(u32::MAX);
        interrupt::free(|cs| unsafe {
            COUNTDOWN.borrow(cs).set(Some(Countdown {
                remaining_ms: period_ms,
                period_ms,
            }));
            let p = TC1::ptr();
            (*p).tcnt1.write(|w| w.bits(0));
            (*p).tccr1b.write(|w| w.bits(WGM12 | CS1_DIV64));
            (*p).timsk.modify(|r, w| w.bits(r.bits() | OCIE1A));
        });
    }

    fn feed(&mut self, _handle: &mut TimerHandle) {
        interrupt::free(|cs| {
            let countdown = COUNTDOWN.borrow(cs);
            if let Some(mut state) = countdown.get() {
                state.remaining_ms = state.period_ms;
                countdown.set(Some(state));
            }
        });
    }

    fn release(&mut self, _handle: TimerHandle) {
        interrupt::free(|cs| unsafe {
            let p = TC1::ptr();
            (*p).timsk.modify(|r, w| w.bits(r.bits() & !OCIE1A));
            (*p).tccr1b.write(|w| w.bits(0));
            COUNTDOWN.borrow(cs).set(None);
        });
    }
}

#[avr_device::interrupt(atmega128a)]
fn TIMER1_COMPA() {
    let expired = interrupt::free(|cs| {
        let countdown = COUNTDOWN.borrow(cs);
        match countdown.get() {
            Some(state) if state.remaining_ms <= 1 => {
                countdown.set(None);
                true
            }
            Some(mut state) => {
                state.remaining_ms -= 1;
                countdown.set(Some(state));
                false
            }
            None => false,
        }
    });

    if expired {
        SUPERVISION.expire(&mut AvrReset::new());
    }
}
