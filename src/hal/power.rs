//! ATmega128 sleep states
//!
//! Light sleep is Idle mode, deep sleep is Power-save with the asynchronous
//! Timer/Counter0 left running as the wake source. Both keep SRAM and registers,
//! so every sleep returns to the caller.

use avr_device::atmega128a::CPU;

use super::rtc;
use super::watchdog::AvrReset;
use crate::error::SleepError;
use crate::platform::{Housekeeping, SleepControl, SystemReset};

// MCUCR
const SE: u8 = 1 << 5;
const SM_MASK: u8 = (1 << 4) | (1 << 3) | (1 << 2);

/// Sleep mode select, encoded as SM2:SM1:SM0.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SleepState {
    Idle = 0b000,
    PowerDown = 0b010,
    PowerSave = 0b011,
}

impl SleepState {
    /// SM0 is MCUCR bit 3, SM1 bit 4, SM2 bit 2.
    const fn mcucr_bits(self) -> u8 {
        let mode = self as u8;
        ((mode & 0b001) << 3) | ((mode & 0b010) << 3) | (mode & 0b100)
    }
}

pub struct Power {
    _private: (),
}

impl Power {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Sleeps in `state` until the next enabled interrupt.
    ///
    /// Interrupts must be enabled; the caller is never inside `interrupt::free`.
    pub fn enter(&mut self, state: SleepState) {
        unsafe {
            let p = CPU::ptr();
            (*p).mcucr
                .modify(|r, w| w.bits((r.bits() & !SM_MASK) | state.mcucr_bits() | SE));
        }
        avr_device::asm::sleep();
        unsafe {
            let p = CPU::ptr();
            (*p).mcucr.modify(|r, w| w.bits(r.bits() & !SE));
        }
    }
}

impl Default for Power {
    fn default() -> Self {
        Self::new()
    }
}

impl Housekeeping for Power {
    fn yield_now(&mut self) {
        self.enter(SleepState::Idle);
    }
}

/// Sleep control backed by the Timer/Counter0 alarm.
///
/// The counter overflows once per second and every overflow wakes the CPU; those
/// wakes come back as `WouldBlock` until the alarm itself has fired. Other
/// interrupts, such as INT0, end the sleep early.
pub struct RtcSleep {
    power: Power,
}

impl RtcSleep {
    /// `clock` proves Timer/Counter0 is running from the crystal.
    pub fn new(_clock: &rtc::RtcClock) -> Self {
        Self {
            power: Power::new(),
        }
    }
}

impl Housekeeping for RtcSleep {
    fn yield_now(&mut self) {
        self.power.yield_now();
    }
}

impl SleepControl for RtcSleep {
    fn enable_timer_wakeup(&mut self, duration_ms: u64) -> Result<(), SleepError> {
        rtc::set_alarm(duration_ms)
    }

    fn disable_timer_wakeup(&mut self) {
        rtc::cancel_alarm();
    }

    fn light_sleep(&mut self) -> nb::Result<(), SleepError> {
        rtc::begin_sleep();
        self.power.enter(SleepState::Idle);
        rtc::poll_alarm()
    }

    fn deep_sleep(&mut self) -> nb::Result<(), SleepError> {
        // pending asynchronous register updates would keep Power-save from waking
        rtc::sync();
        rtc::begin_sleep();
        self.power.enter(SleepState::PowerSave);
        rtc::poll_alarm()
    }

    fn sleep_forever(&mut self) -> ! {
        rtc::stop();
        self.power.enter(SleepState::PowerDown);
        // an external wake restarts the firmware like a deep-sleep wake would
        AvrReset::new().force_reset()
    }
}
