//! Timer/Counter0 clocked from the 32.768 kHz crystal on TOSC1/TOSC2
//!
//! With the /128 prescaler the counter advances 256 times a second and overflows
//! once a second. The overflow count plus TCNT0 is the sleep-proof uptime, and the
//! output compare unit doubles as the wake alarm.

use core::cell::Cell;

use avr_device::atmega128a::TC0;
use avr_device::interrupt::{self, CriticalSection, Mutex};

use crate::config::RTC_CRYSTAL_HZ;
use crate::error::SleepError;
use crate::platform::Clock;

// ASSR
const AS0: u8 = 1 << 3;
const TCN0UB: u8 = 1 << 2;
const OCR0UB: u8 = 1 << 1;
const TCR0UB: u8 = 1 << 0;
// TIMSK / TIFR
const OCIE0: u8 = 1 << 1;
const TOIE0: u8 = 1 << 0;
const OCF0: u8 = 1 << 1;
const TOV0: u8 = 1 << 0;
// TCCR0, CS02:0 = 101
const CS_DIV128: u8 = 0b101;

const TICKS_PER_SECOND: u64 = (RTC_CRYSTAL_HZ / 128) as u64;

static RUNNING: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));
static OVERFLOWS: Mutex<Cell<u64>> = Mutex::new(Cell::new(0));
/// Absolute tick at which the pending alarm fires.
static ALARM: Mutex<Cell<Option<u64>>> = Mutex::new(Cell::new(None));
/// Set by the overflow interrupt; tells a once-a-second wake from a real one.
static OVERFLOW_WAKE: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));

/// Millisecond clock that keeps counting through Idle and Power-save.
#[derive(Clone, Copy)]
pub struct RtcClock {
    _private: (),
}

impl RtcClock {
    /// Switches Timer/Counter0 to the crystal and starts it.
    pub fn start() -> Self {
        interrupt::free(|cs| {
            unsafe {
                let p = TC0::ptr();
                (*p).timsk.modify(|r, w| w.bits(r.bits() & !(OCIE0 | TOIE0)));
                (*p).assr.write(|w| w.bits(AS0));
                (*p).tcnt0.write(|w| w.bits(0));
                (*p).ocr0.write(|w| w.bits(0));
                (*p).tccr0.write(|w| w.bits(CS_DIV128));
            }
            wait_for_updates();
            unsafe {
                let p = TC0::ptr();
                (*p).tifr.write(|w| w.bits(OCF0 | TOV0));
                (*p).timsk.modify(|r, w| w.bits(r.bits() | TOIE0));
            }
            OVERFLOWS.borrow(cs).set(0);
            RUNNING.borrow(cs).set(true);
        });
        Self { _private: () }
    }
}

impl Clock for RtcClock {
    fn now_ms(&self) -> u64 {
        interrupt::free(|cs| ticks_to_ms(now_ticks(cs)))
    }
}

const fn ticks_to_ms(ticks: u64) -> u64 {
    ticks.saturating_mul(1000) / TICKS_PER_SECOND
}

/// Rounds up so the alarm never fires early.
const fn ms_to_ticks(ms: u64) -> u64 {
    ms.saturating_mul(TICKS_PER_SECOND)
        .saturating_add(999)
        / 1000
}

fn wait_for_updates() {
    unsafe {
        let p = TC0::ptr();
        while (*p).assr.read().bits() & (TCN0UB | OCR0UB | TCR0UB) != 0 {}
    }
}

fn now_ticks(cs: CriticalSection) -> u64 {
    let (count, overflow_pending) = unsafe {
        let p = TC0::ptr();
        let count = (*p).tcnt0.read().bits();
        let pending = (*p).tifr.read().bits() & TOV0 != 0;
        (count, pending)
    };
    let mut overflows = OVERFLOWS.borrow(cs).get();
    // the counter wrapped but the overflow interrupt has not run yet
    if overflow_pending && count < 128 {
        overflows += 1;
    }
    overflows * 256 + u64::from(count)
}

fn set_compare(enabled: bool, value: u8) {
    unsafe {
        let p = TC0::ptr();
        if enabled {
            (*p).ocr0.write(|w| w.bits(value));
            (*p).tifr.write(|w| w.bits(OCF0));
            (*p).timsk.modify(|r, w| w.bits(r.bits() | OCIE0));
        } else {
            (*p).timsk.modify(|r, w| w.bits(r.bits() & !OCIE0));
        }
    }
}

fn fire(cs: CriticalSection) {
    ALARM.borrow(cs).set(None);
    set_compare(false, 0);
}

/// Arms the compare unit once the alarm falls within the current counter window.
fn schedule(cs: CriticalSection, target: u64) {
    let window = OVERFLOWS.borrow(cs).get();
    match (target >> 8).cmp(&window) {
        core::cmp::Ordering::Greater => {}
        core::cmp::Ordering::Equal if target as u8 != 0 => set_compare(true, target as u8),
        _ => fire(cs),
    }
}

pub(crate) fn set_alarm(duration_ms: u64) -> Result<(), SleepError> {
    interrupt::free(|cs| {
        if !RUNNING.borrow(cs).get() {
            return Err(SleepError::WakeSourceUnavailable);
        }
        let target = now_ticks(cs) + ms_to_ticks(duration_ms).max(1);
        ALARM.borrow(cs).set(Some(target));
        schedule(cs, target);
        Ok(())
    })
}

pub(crate) fn cancel_alarm() {
    interrupt::free(fire);
}

/// Call right before sleeping so [`poll_alarm`] can tell what woke the CPU.
pub(crate) fn begin_sleep() {
    interrupt::free(|cs| OVERFLOW_WAKE.borrow(cs).set(false));
}

/// `WouldBlock` when only the counter overflow woke the CPU. Any other interrupt
/// ends the sleep early; the alarm stays armed until cancelled.
pub(crate) fn poll_alarm() -> nb::Result<(), SleepError> {
    interrupt::free(|cs| {
        let alarm_pending = ALARM.borrow(cs).get().is_some();
        if alarm_pending && OVERFLOW_WAKE.borrow(cs).get() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    })
}

/// Waits until written asynchronous registers have reached the timer domain.
pub(crate) fn sync() {
    wait_for_updates();
}

/// Silences both Timer/Counter0 interrupts so they no longer wake the CPU.
pub(crate) fn stop() {
    interrupt::free(|cs| {
        ALARM.borrow(cs).set(None);
        unsafe {
            let p = TC0::ptr();
            (*p).timsk.modify(|r, w| w.bits(r.bits() & !(OCIE0 | TOIE0)));
        }
        RUNNING.borrow(cs).set(false);
    });
}

#[avr_device::interrupt(atmega128a)]
fn TIMER0_OVF() {
    interrupt::free(|cs| {
        let overflows = OVERFLOWS.borrow(cs);
        overflows.set(overflows.get() + 1);
        OVERFLOW_WAKE.borrow(cs).set(true);
        if let Some(target) = ALARM.borrow(cs).get() {
            schedule(cs, target);
        }
    });
}

#[avr_device::interrupt(atmega128a)]
fn TIMER0_COMP() {
    interrupt::free(|cs| {
        if let Some(target) = ALARM.borrow(cs).get() {
            if target >> 8 <= OVERFLOWS.borrow(cs).get() {
                fire(cs);
            }
        }
    });
}
