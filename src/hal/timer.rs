use core::cell::Cell;

use avr_device::atmega128a::TC2;
use avr_device::interrupt::{self, Mutex};
use embedded_hal::blocking::delay::DelayMs;

use crate::config::CPU_FREQ_HZ;
use crate::platform::Clock;

// TCCR2: CTC mode, CS22:0 = 011 (/64)
const WGM21: u8 = 1 << 3;
const CS_DIV64: u8 = 0b011;
// TIMSK
const OCIE2: u8 = 1 << 7;

// 16MHz / 64 = 250kHz, 250 ticks = 1ms
const OCR2_1MS: u8 = (CPU_FREQ_HZ / 64 / 1000 - 1) as u8;

static MILLIS: Mutex<Cell<u64>> = Mutex::new(Cell::new(0));

/// Millisecond uptime from the Timer/Counter2 compare interrupt.
///
/// Stops while the CPU is in Power-save or Power-down, so it only backs targets
/// that never leave Idle.
#[derive(Clone, Copy)]
pub struct UptimeClock {
    _private: (),
}

impl UptimeClock {
    pub fn start() -> Self {
        interrupt::free(|cs| unsafe {
            let p = TC2::ptr();
            (*p).tccr2.write(|w| w.bits(0));
            (*p).tcnt2.write(|w| w.bits(0));
            (*p).ocr2.write(|w| w.bits(OCR2_1MS));
            (*p).tccr2.write(|w| w.bits(WGM21 | CS_DIV64));
            (*p).timsk.modify(|r, w| w.bits(r.bits() | OCIE2));
            MILLIS.borrow(cs).set(0);
        });
        Self { _private: () }
    }
}

impl Clock for UptimeClock {
    fn now_ms(&self) -> u64 {
        interrupt::free(|cs| MILLIS.borrow(cs).get())
    }
}

/// Blocking delay that spins on the uptime clock.
pub struct BusyDelay {
    clock: UptimeClock,
}

impl BusyDelay {
    pub fn new(clock: UptimeClock) -> Self {
        Self { clock }
    }
}

impl DelayMs<u32> for BusyDelay {
    fn delay_ms(&mut self, ms: u32) {
        let start = self.clock.now_ms();
        while self.clock.now_ms() - start < u64::from(ms) {
            avr_device::asm::nop();
        }
    }
}

#[avr_device::interrupt(atmega128a)]
fn TIMER2_COMP() {
    interrupt::free(|cs| {
        let millis = MILLIS.borrow(cs);
        millis.set(millis.get() + 1);
    });
}
