//! Task watchdog supervisor
//!
//! Owns the watchdog hardware handle. A task that never returns lets the one-shot
//! countdown run out; the expiry interrupt then goes through [`SupervisionHook::expire`]
//! and the device resets.

use core::cell::Cell;

use critical_section::Mutex;
use ufmt::derive::uDebug;

use crate::platform::{SystemReset, WatchdogTimer};

/// Task timeout selections. Raw values outside the table map to [`Ms15`](Self::Ms15).
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WatchdogTimeout {
    Ms15 = 0,
    Ms30 = 1,
    Ms60 = 2,
    Ms120 = 3,
    Ms250 = 4,
    Ms500 = 5,
    Ms1000 = 6,
    Ms2000 = 7,
    Ms4000 = 8,
    Ms8000 = 9,
    NoSupervision = 10,
}

impl WatchdogTimeout {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Ms15,
            1 => Self::Ms30,
            2 => Self::Ms60,
            3 => Self::Ms120,
            4 => Self::Ms250,
            5 => Self::Ms500,
            6 => Self::Ms1000,
            7 => Self::Ms2000,
            8 => Self::Ms4000,
            9 => Self::Ms8000,
            10 => Self::NoSupervision,
            // never weaken supervision on a bad value
            _ => Self::Ms15,
        }
    }

    /// Countdown length, `None` for [`NoSupervision`](Self::NoSupervision).
    pub const fn duration_ms(self) -> Option<u64> {
        match self {
            Self::Ms15 => Some(15),
            Self::Ms30 => Some(30),
            Self::Ms60 => Some(60),
            Self::Ms120 => Some(120),
            Self::Ms250 => Some(250),
            Self::Ms500 => Some(500),
            Self::Ms1000 => Some(1000),
            Self::Ms2000 => Some(2000),
            Self::Ms4000 => Some(4000),
            Self::Ms8000 => Some(8000),
            Self::NoSupervision => None,
        }
    }
}

impl From<u8> for WatchdogTimeout {
    fn from(raw: u8) -> Self {
        Self::from_raw(raw)
    }
}

/// Exclusive owner of the watchdog hardware handle.
pub struct WatchdogSupervisor<T: WatchdogTimer> {
    timer: T,
    handle: Option<T::Handle>,
    /// Last armed selection while enabled.
    selection: Option<WatchdogTimeout>,
}

impl<T: WatchdogTimer> WatchdogSupervisor<T> {
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            handle: None,
            selection: None,
        }
    }

    /// Arms the watchdog, creating the hardware binding on first use.
    /// [`WatchdogTimeout::NoSupervision`] disables it instead.
    pub fn enable(&mut self, selection: WatchdogTimeout) {
        let Some(duration_ms) = selection.duration_ms() else {
            self.disable();
            return;
        };

        let timer = &mut self.timer;
        let handle = self.handle.get_or_insert_with(|| {
            trace!("watchdog: binding timer");
            timer.create()
        });
        timer.yield_before_arm();
        timer.arm(handle, duration_ms);
        self.selection = Some(selection);
        trace!("watchdog: armed for {} ms", duration_ms);
    }

    /// Detaches and frees the hardware timer. Safe to call when already disabled.
    pub fn disable(&mut self) {
        self.selection = None;
        if let Some(handle) = self.handle.take() {
            self.timer.release(handle);
            trace!("watchdog: released");
        }
    }

    /// Feeds the watchdog; a no-op while disabled.
    pub fn reset(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            self.timer.feed(handle);
        }
    }

    /// Keeps every watchdog quiet during a busy wait, including hardware that
    /// outlives [`disable`](Self::disable).
    pub fn keep_alive(&mut self) {
        self.reset();
        self.timer.service();
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    /// The armed selection, `None` while disabled.
    pub fn selection(&self) -> Option<WatchdogTimeout> {
        self.selection
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

/// Supervisory callback run from the expiry interrupt.
pub type SupervisionFn = fn();

/// Interrupt-reachable slot for the supervisory callback and its time budget.
///
/// The expiry interrupt cannot borrow the scheduler, so this lives in a `static`
/// next to the interrupt handler.
pub struct SupervisionHook {
    callback: Mutex<Cell<Option<SupervisionFn>>>,
    timeout: Mutex<Cell<WatchdogTimeout>>,
}

impl SupervisionHook {
    pub const fn new() -> Self {
        Self {
            callback: Mutex::new(Cell::new(None)),
            timeout: Mutex::new(Cell::new(WatchdogTimeout::Ms1000)),
        }
    }

    /// Registers `callback`. It runs in interrupt context and must finish within
    /// `timeout`, after which the fail-safe reset fires regardless.
    pub fn set(&self, callback: SupervisionFn, timeout: WatchdogTimeout) {
        critical_section::with(|cs| {
            self.callback.borrow(cs).set(Some(callback));
            self.timeout.borrow(cs).set(timeout);
        });
    }

    pub fn clear(&self) {
        critical_section::with(|cs| self.callback.borrow(cs).set(None));
    }

    /// Expiry path: run the callback under the fail-safe bound, then reset.
    pub fn expire<R: SystemReset>(&self, reset: &mut R) -> ! {
        let (callback, timeout) = critical_section::with(|cs| {
            (self.callback.borrow(cs).get(), self.timeout.borrow(cs).get())
        });

        if let Some(callback) = callback {
            // a NoSupervision budget would leave a hung callback unbounded
            let bound = match timeout {
                WatchdogTimeout::NoSupervision => WatchdogTimeout::Ms1000,
                t => t,
            };
            reset.arm_failsafe(bound);
            callback();
        }

        error!("watchdog expired, resetting");
        reset.force_reset()
    }
}

impl Default for SupervisionHook {
    fn default() -> Self {
        Self::new()
    }
}
