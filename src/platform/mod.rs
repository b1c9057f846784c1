//! Platform capability traits
//!
//! The decision engine and the sleep executor only see these traits. The ATmega128
//! drivers in `crate::hal` implement them on hardware; [`mock`] implements them on
//! the host for tests.

use crate::error::SleepError;
use crate::rtos::WatchdogTimeout;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Millisecond timestamp source.
///
/// Must be non-decreasing and valid right after waking from any sleep depth.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// A single cooperative yield to background work, used on the idle path.
pub trait Housekeeping {
    fn yield_now(&mut self);
}

/// Hardware behind the task watchdog.
///
/// The handle exists from [`create`](Self::create) until [`release`](Self::release)
/// consumes it, so a released timer cannot be touched again.
pub trait WatchdogTimer {
    type Handle;

    /// Claims the timer and binds the expiry interrupt.
    fn create(&mut self) -> Self::Handle;

    /// Arms a one-shot expiry `duration_ms` from now.
    fn arm(&mut self, handle: &mut Self::Handle, duration_ms: u64);

    /// Rewinds the countdown to zero elapsed.
    fn feed(&mut self, handle: &mut Self::Handle);

    /// Detaches the interrupt and frees the timer.
    fn release(&mut self, handle: Self::Handle);

    /// Called before every arm on silicon that needs background work to run first.
    fn yield_before_arm(&mut self) {}

    /// Feeds watchdog hardware that survives [`release`](Self::release), such as a
    /// fuse-locked WDT. Only used while busy-waiting.
    fn service(&mut self) {}
}

/// The fatal end of the watchdog expiry path.
pub trait SystemReset {
    /// Starts an independent reset countdown bounding whatever runs next.
    fn arm_failsafe(&mut self, timeout: WatchdogTimeout);

    fn force_reset(&mut self) -> !;
}

/// Hardware sleep states and their timer wake source.
pub trait SleepControl: Housekeeping {
    fn enable_timer_wakeup(&mut self, duration_ms: u64) -> Result<(), SleepError>;

    fn disable_timer_wakeup(&mut self);

    /// Enters light sleep. `WouldBlock` means the CPU woke for clock housekeeping
    /// before the wake source fired and should go back to sleep.
    fn light_sleep(&mut self) -> nb::Result<(), SleepError>;

    /// Enters deep sleep. Same contract as [`light_sleep`](Self::light_sleep); on
    /// chips where deep sleep loses state this does not return.
    fn deep_sleep(&mut self) -> nb::Result<(), SleepError>;

    /// Deepest sleep with every timer wake source off. Only an external wake or a
    /// reset ends it.
    fn sleep_forever(&mut self) -> !;
}
