//! Mock platform for host tests
//!
//! All mocks share one [`MockClock`]; sleeping and delaying advance it so the
//! scheduler sees time pass the way it would on hardware.

use core::cell::Cell;

use embedded_hal::blocking::delay::DelayMs;

use super::{Clock, Housekeeping, SleepControl, SystemReset, WatchdogTimer};
use crate::error::SleepError;
use crate::rtos::WatchdogTimeout;

/// Settable millisecond clock.
#[derive(Debug, Default)]
pub struct MockClock {
    now: Cell<u64>,
}

impl MockClock {
    pub const fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Proof of a claimed mock timer; deliberately not `Clone`.
#[derive(Debug)]
pub struct MockTimerHandle(());

/// One-shot countdown judged against the shared clock.
#[derive(Debug)]
pub struct MockWatchdogTimer<'c> {
    clock: &'c MockClock,
    deadline: Option<u64>,
    duration_ms: u64,
    rearm_yield: bool,
    pub created: u32,
    pub armed: u32,
    pub fed: u32,
    pub released: u32,
    pub fired: u32,
    pub serviced: u32,
    pub yields_before_arm: u32,
}

impl<'c> MockWatchdogTimer<'c> {
    pub fn new(clock: &'c MockClock) -> Self {
        Self {
            clock,
            deadline: None,
            duration_ms: 0,
            rearm_yield: false,
            created: 0,
            armed: 0,
            fed: 0,
            released: 0,
            fired: 0,
            serviced: 0,
            yields_before_arm: 0,
        }
    }

    /// Behave like silicon that needs a yield before arming.
    pub fn with_rearm_yield(mut self) -> Self {
        self.rearm_yield = true;
        self
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Simulates the expiry interrupt: true once when the deadline has passed.
    pub fn poll_expired(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if self.clock.now_ms() >= deadline => {
                self.deadline = None;
                self.fired += 1;
                true
            }
            _ => false,
        }
    }
}

impl WatchdogTimer for MockWatchdogTimer<'_> {
    type Handle = MockTimerHandle;

    fn create(&mut self) -> MockTimerHandle {
        self.created += 1;
        MockTimerHandle(())
    }

    fn arm(&mut self, _handle: &mut MockTimerHandle, duration_ms: u64) {
        self.armed += 1;
        self.duration_ms = duration_ms;
        self.deadline = Some(self.clock.now_ms() + duration_ms);
    }

    fn feed(&mut self, _handle: &mut MockTimerHandle) {
        self.fed += 1;
        if self.deadline.is_some() {
            self.deadline = Some(self.clock.now_ms() + self.duration_ms);
        }
    }

    fn release(&mut self, _handle: MockTimerHandle) {
        self.released += 1;
        self.deadline = None;
    }

    fn yield_before_arm(&mut self) {
        if self.rearm_yield {
            self.yields_before_arm += 1;
        }
    }

    fn service(&mut self) {
        self.serviced += 1;
    }
}

/// Records the reset path and unwinds instead of resetting.
#[derive(Debug, Default)]
pub struct MockReset {
    pub failsafe: Option<WatchdogTimeout>,
    pub resets: u32,
}

impl SystemReset for MockReset {
    fn arm_failsafe(&mut self, timeout: WatchdogTimeout) {
        self.failsafe = Some(timeout);
    }

    fn force_reset(&mut self) -> ! {
        self.resets += 1;
        panic!("forced reset");
    }
}

/// Sleep hardware that wakes exactly when its timer says so.
#[derive(Debug)]
pub struct MockSleep<'c> {
    clock: &'c MockClock,
    wakeup_ms: Option<u64>,
    fail_next: Option<SleepError>,
    refuse_wake_source: bool,
    housekeeping_wakes: u32,
    pub yields: u32,
    pub light_sleeps: u32,
    pub deep_sleeps: u32,
    pub wakeups_enabled: u32,
    pub wakeups_disabled: u32,
    pub last_wakeup_ms: Option<u64>,
}

impl<'c> MockSleep<'c> {
    pub fn new(clock: &'c MockClock) -> Self {
        Self {
            clock,
            wakeup_ms: None,
            fail_next: None,
            refuse_wake_source: false,
            housekeeping_wakes: 0,
            yields: 0,
            light_sleeps: 0,
            deep_sleeps: 0,
            wakeups_enabled: 0,
            wakeups_disabled: 0,
            last_wakeup_ms: None,
        }
    }

    /// The next sleep entry fails with `error`.
    pub fn fail_next(&mut self, error: SleepError) {
        self.fail_next = Some(error);
    }

    pub fn refuse_wake_source(&mut self) {
        self.refuse_wake_source = true;
    }

    /// The next sleeps wake `count` times early for clock housekeeping.
    pub fn housekeeping_wakes(&mut self, count: u32) {
        self.housekeeping_wakes = count;
    }

    pub fn wakeup_armed(&self) -> Option<u64> {
        self.wakeup_ms
    }

    fn enter(&mut self) -> nb::Result<(), SleepError> {
        if let Some(error) = self.fail_next.take() {
            return Err(nb::Error::Other(error));
        }
        if self.housekeeping_wakes > 0 {
            self.housekeeping_wakes -= 1;
            return Err(nb::Error::WouldBlock);
        }
        // without a timer wake source an external interrupt wakes us immediately
        self.clock.advance(self.wakeup_ms.unwrap_or(0));
        Ok(())
    }
}

impl Housekeeping for MockSleep<'_> {
    fn yield_now(&mut self) {
        self.yields += 1;
    }
}

impl SleepControl for MockSleep<'_> {
    fn enable_timer_wakeup(&mut self, duration_ms: u64) -> Result<(), SleepError> {
        if self.refuse_wake_source {
            return Err(SleepError::WakeSourceUnavailable);
        }
        self.wakeups_enabled += 1;
        self.wakeup_ms = Some(duration_ms);
        self.last_wakeup_ms = Some(duration_ms);
        Ok(())
    }

    fn disable_timer_wakeup(&mut self) {
        self.wakeups_disabled += 1;
        self.wakeup_ms = None;
    }

    fn light_sleep(&mut self) -> nb::Result<(), SleepError> {
        self.light_sleeps += 1;
        self.enter()
    }

    fn deep_sleep(&mut self) -> nb::Result<(), SleepError> {
        self.deep_sleeps += 1;
        self.enter()
    }

    fn sleep_forever(&mut self) -> ! {
        panic!("sleeping forever");
    }
}

/// Busy delay that advances the shared clock.
#[derive(Debug)]
pub struct MockDelay<'c> {
    clock: &'c MockClock,
    pub calls: u32,
    pub total_ms: u64,
    pub longest_ms: u32,
}

impl<'c> MockDelay<'c> {
    pub fn new(clock: &'c MockClock) -> Self {
        Self {
            clock,
            calls: 0,
            total_ms: 0,
            longest_ms: 0,
        }
    }
}

impl DelayMs<u32> for MockDelay<'_> {
    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += u64::from(ms);
        self.longest_ms = self.longest_ms.max(ms);
        self.clock.advance(u64::from(ms));
    }
}

/// Counts cooperative yields.
#[derive(Debug, Default)]
pub struct MockHousekeeping {
    pub yields: u32,
}

impl Housekeeping for MockHousekeeping {
    fn yield_now(&mut self) {
        self.yields += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_advances_clock() {
        let clock = MockClock::new(10);
        let mut delay = MockDelay::new(&clock);
        delay.delay_ms(250);
        delay.delay_ms(5);
        assert_eq!(clock.now_ms(), 265);
        assert_eq!(delay.total_ms, 255);
        assert_eq!(delay.longest_ms, 250);
    }

    #[test]
    fn sleep_wakes_on_timer() {
        let clock = MockClock::new(0);
        let mut sleep = MockSleep::new(&clock);
        sleep.enable_timer_wakeup(40).unwrap();
        assert_eq!(sleep.light_sleep(), Ok(()));
        assert_eq!(clock.now_ms(), 40);
    }

    #[test]
    fn sleep_reports_housekeeping_wakes() {
        let clock = MockClock::new(0);
        let mut sleep = MockSleep::new(&clock);
        sleep.housekeeping_wakes(1);
        assert_eq!(sleep.deep_sleep(), Err(nb::Error::WouldBlock));
        assert_eq!(sleep.deep_sleep(), Ok(()));
    }
}
