//! Sleep executor
//!
//! [`SleepBackend`] is the capability the scheduler drives once the decision is
//! made. [`HardwareSleep`] serves chips with light and deep sleep, [`ActiveWait`]
//! serves chips that can only burn time in a bounded busy delay.

use embedded_hal::blocking::delay::DelayMs;
use ufmt::derive::uDebug;

use super::watchdog::WatchdogSupervisor;
use crate::config::PowerConfig;
use crate::error::SleepError;
use crate::platform::{Housekeeping, SleepControl, WatchdogTimer};

/// How the CPU spends the wait, as reported to the before-sleep callback.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepMethod {
    /// Busy delay with the CPU running.
    Active,
    LightSleep,
    DeepSleep,
}

/// Called right before the CPU suspends, with the duration actually requested.
///
/// Runs with interrupts enabled on the path to sleep entry; keep it short.
pub type BeforeSleepFn = fn(SleepMethod, u64);

/// Final wait, re-read just before committing to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    /// 0 with an empty queue means no known upper bound.
    pub wait_ms: u64,
    pub queue_empty: bool,
}

/// What was requested from the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepReport {
    pub method: SleepMethod,
    pub requested_ms: u64,
}

pub trait SleepBackend {
    /// One cooperative yield.
    fn idle(&mut self);

    /// Spends `plan.wait_ms` in the cheapest state the platform offers.
    fn sleep<W: WatchdogTimer>(
        &mut self,
        plan: SleepPlan,
        config: &PowerConfig,
        watchdog: &mut WatchdogSupervisor<W>,
        before_sleep: Option<BeforeSleepFn>,
    ) -> Result<SleepReport, SleepError>;
}

/// Shortens a deep-sleep request to absorb slow-clock drift. The result is always
/// strictly shorter than a non-zero `wait_ms`.
pub fn compensate_drift(wait_ms: u64, permille: u16) -> u64 {
    let reduction = (wait_ms / 1000)
        .saturating_mul(u64::from(permille))
        .saturating_add(wait_ms % 1000 * u64::from(permille) / 1000)
        .max(1);
    wait_ms.saturating_sub(reduction)
}

fn notify(before_sleep: Option<BeforeSleepFn>, method: SleepMethod, requested_ms: u64) {
    if let Some(callback) = before_sleep {
        callback(method, requested_ms);
    }
}

/// Light/deep sleep with a timer wake source and drift compensation.
pub struct HardwareSleep<S> {
    control: S,
}

impl<S: SleepControl> HardwareSleep<S> {
    pub const fn new(control: S) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &S {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut S {
        &mut self.control
    }

    fn suspend(&mut self, method: SleepMethod) -> Result<(), SleepError> {
        loop {
            let entered = match method {
                SleepMethod::DeepSleep => self.control.deep_sleep(),
                _ => self.control.light_sleep(),
            };
            match entered {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
    }
}

impl<S: SleepControl> SleepBackend for HardwareSleep<S> {
    fn idle(&mut self) {
        self.control.yield_now();
    }

    fn sleep<W: WatchdogTimer>(
        &mut self,
        plan: SleepPlan,
        config: &PowerConfig,
        _watchdog: &mut WatchdogSupervisor<W>,
        before_sleep: Option<BeforeSleepFn>,
    ) -> Result<SleepReport, SleepError> {
        if plan.wait_ms == 0 && plan.queue_empty {
            if config.allow_indefinite_sleep {
                info!("sleep: nothing scheduled, sleeping until external wake");
                notify(before_sleep, SleepMethod::DeepSleep, 0);
                self.control.sleep_forever();
            }
            // no timer wake source; an external interrupt ends this
            notify(before_sleep, SleepMethod::LightSleep, 0);
            self.suspend(SleepMethod::LightSleep)?;
            return Ok(SleepReport {
                method: SleepMethod::LightSleep,
                requested_ms: 0,
            });
        }

        let wait_ms = plan.wait_ms.max(1);
        let (method, requested_ms) = if wait_ms > config.deep_sleep_threshold_ms {
            (
                SleepMethod::DeepSleep,
                compensate_drift(wait_ms, config.drift_compensation_permille),
            )
        } else {
            (SleepMethod::LightSleep, wait_ms)
        };

        self.control.enable_timer_wakeup(requested_ms)?;
        debug!("sleep: {:?} for {} ms (wait {})", method, requested_ms, wait_ms);
        notify(before_sleep, method, requested_ms);

        let slept = self.suspend(method);
        self.control.disable_timer_wakeup();
        slept.map(|()| SleepReport {
            method,
            requested_ms,
        })
    }
}

/// Bounded busy delay for chips without hardware sleep.
pub struct ActiveWait<H, D> {
    housekeeping: H,
    delay: D,
}

impl<H: Housekeeping, D: DelayMs<u32>> ActiveWait<H, D> {
    pub const fn new(housekeeping: H, delay: D) -> Self {
        Self {
            housekeeping,
            delay,
        }
    }

    pub fn housekeeping(&self) -> &H {
        &self.housekeeping
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }
}

impl<H: Housekeeping, D: DelayMs<u32>> SleepBackend for ActiveWait<H, D> {
    fn idle(&mut self) {
        self.housekeeping.yield_now();
    }

    fn sleep<W: WatchdogTimer>(
        &mut self,
        plan: SleepPlan,
        config: &PowerConfig,
        watchdog: &mut WatchdogSupervisor<W>,
        before_sleep: Option<BeforeSleepFn>,
    ) -> Result<SleepReport, SleepError> {
        let wait_ms = if plan.wait_ms == 0 && !plan.queue_empty {
            1
        } else {
            plan.wait_ms
        };
        let requested_ms = wait_ms.min(config.max_active_wait_ms);
        if requested_ms == 0 {
            // nothing scheduled: a busy wait has no bound, so hand the CPU back once
            self.housekeeping.yield_now();
            return Ok(SleepReport {
                method: SleepMethod::Active,
                requested_ms,
            });
        }
        notify(before_sleep, SleepMethod::Active, requested_ms);

        let slice = u64::from(config.active_wait_slice_ms.max(1));
        let mut remaining = requested_ms;
        while remaining > 0 {
            let step = remaining.min(slice);
            // step <= active_wait_slice_ms, which is a u32
            self.delay.delay_ms(step as u32);
            watchdog.keep_alive();
            remaining -= step;
        }

        Ok(SleepReport {
            method: SleepMethod::Active,
            requested_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockClock, MockDelay, MockHousekeeping, MockSleep, MockWatchdogTimer};
    use crate::platform::Clock;
    use embedded_hal_mock::delay::MockNoop;
    use std::cell::RefCell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    thread_local! {
        static OBSERVED: RefCell<Vec<(SleepMethod, u64)>> = RefCell::new(Vec::new());
    }

    fn observe(method: SleepMethod, ms: u64) {
        OBSERVED.with(|seen| seen.borrow_mut().push((method, ms)));
    }

    fn observed() -> Vec<(SleepMethod, u64)> {
        OBSERVED.with(|seen| seen.borrow_mut().drain(..).collect())
    }

    fn plan(wait_ms: u64, queue_empty: bool) -> SleepPlan {
        SleepPlan {
            wait_ms,
            queue_empty,
        }
    }

    #[test]
    fn drift_compensation_always_shortens() {
        assert_eq!(compensate_drift(30_000, 50), 28_500);
        assert_eq!(compensate_drift(10_001, 50), 9_501);
        assert_eq!(compensate_drift(20_000, 0), 19_999);
        assert_eq!(compensate_drift(u64::MAX, 50), u64::MAX - (u64::MAX / 1000) * 50 - 30);
        for wait in [10_001u64, 15_000, 86_400_000] {
            for permille in [0u16, 1, 50, 999] {
                assert!(compensate_drift(wait, permille) < wait);
            }
        }
    }

    #[test]
    fn short_wait_uses_light_sleep() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let report = backend
            .sleep(plan(4_000, false), &PowerConfig::new(), &mut wdt, Some(observe))
            .unwrap();

        assert_eq!(report.method, SleepMethod::LightSleep);
        assert_eq!(report.requested_ms, 4_000);
        assert_eq!(observed(), vec![(SleepMethod::LightSleep, 4_000)]);
        assert_eq!(backend.control().light_sleeps, 1);
        assert_eq!(backend.control().wakeups_disabled, 1);
        assert_eq!(backend.control().wakeup_armed(), None);
        assert_eq!(clock.now_ms(), 4_000);
    }

    #[test]
    fn threshold_wait_stays_light() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));
        let report = backend
            .sleep(plan(10_000, false), &PowerConfig::new(), &mut wdt, None)
            .unwrap();
        assert_eq!(report.method, SleepMethod::LightSleep);
        assert_eq!(report.requested_ms, 10_000);
    }

    #[test]
    fn long_wait_uses_compensated_deep_sleep() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let report = backend
            .sleep(plan(30_000, false), &PowerConfig::new(), &mut wdt, Some(observe))
            .unwrap();

        assert_eq!(report.method, SleepMethod::DeepSleep);
        assert!(report.requested_ms < 30_000);
        assert_eq!(backend.control().last_wakeup_ms, Some(report.requested_ms));
        assert_eq!(observed(), vec![(SleepMethod::DeepSleep, report.requested_ms)]);
        assert_eq!(backend.control().deep_sleeps, 1);
    }

    #[test]
    fn zero_wait_with_pending_task_arms_minimum() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let report = backend
            .sleep(plan(0, false), &PowerConfig::new(), &mut wdt, None)
            .unwrap();

        assert_eq!(report.requested_ms, 1);
        assert_eq!(backend.control().last_wakeup_ms, Some(1));
    }

    #[test]
    fn empty_queue_sleeps_forever_when_allowed() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));
        let config = PowerConfig::new().allow_indefinite_sleep(true);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _ = backend.sleep(plan(0, true), &config, &mut wdt, Some(observe));
        }));

        assert!(outcome.is_err());
        assert_eq!(observed(), vec![(SleepMethod::DeepSleep, 0)]);
    }

    #[test]
    fn empty_queue_without_indefinite_sleep_has_no_timer() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let report = backend
            .sleep(plan(0, true), &PowerConfig::new(), &mut wdt, None)
            .unwrap();

        assert_eq!(report.method, SleepMethod::LightSleep);
        assert_eq!(backend.control().wakeups_enabled, 0);
        assert_eq!(backend.control().light_sleeps, 1);
    }

    #[test]
    fn housekeeping_wakes_resume_sleep() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        backend.control_mut().housekeeping_wakes(3);
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        backend
            .sleep(plan(20_000, false), &PowerConfig::new(), &mut wdt, None)
            .unwrap();

        assert_eq!(backend.control().deep_sleeps, 4);
        assert_eq!(backend.control().wakeups_disabled, 1);
    }

    #[test]
    fn failed_entry_still_disarms_wake_source() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        backend.control_mut().fail_next(SleepError::Rejected);
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let result = backend.sleep(plan(500, false), &PowerConfig::new(), &mut wdt, None);

        assert_eq!(result, Err(SleepError::Rejected));
        assert_eq!(backend.control().wakeup_armed(), None);
    }

    #[test]
    fn unavailable_wake_source_skips_sleep() {
        let clock = MockClock::new(0);
        let mut backend = HardwareSleep::new(MockSleep::new(&clock));
        backend.control_mut().refuse_wake_source();
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let result = backend.sleep(plan(500, false), &PowerConfig::new(), &mut wdt, Some(observe));

        assert_eq!(result, Err(SleepError::WakeSourceUnavailable));
        assert_eq!(backend.control().light_sleeps, 0);
        assert!(observed().is_empty());
    }

    #[test]
    fn active_wait_is_capped_and_fed() {
        let clock = MockClock::new(0);
        let mut backend = ActiveWait::new(MockHousekeeping::default(), MockDelay::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let report = backend
            .sleep(plan(60_000, false), &PowerConfig::new(), &mut wdt, Some(observe))
            .unwrap();

        assert_eq!(report.method, SleepMethod::Active);
        assert_eq!(report.requested_ms, 7_000);
        assert_eq!(observed(), vec![(SleepMethod::Active, 7_000)]);
        assert_eq!(backend.delay().total_ms, 7_000);
        assert_eq!(backend.delay().longest_ms, 250);
        assert_eq!(wdt.timer().serviced, 28);
        assert_eq!(clock.now_ms(), 7_000);
    }

    #[test]
    fn active_wait_short_wait_runs_to_completion() {
        let clock = MockClock::new(0);
        let mut backend = ActiveWait::new(MockHousekeeping::default(), MockDelay::new(&clock));
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let report = backend
            .sleep(plan(600, false), &PowerConfig::new(), &mut wdt, None)
            .unwrap();

        assert_eq!(report.requested_ms, 600);
        assert_eq!(backend.delay().calls, 3);
        assert_eq!(backend.delay().total_ms, 600);
    }

    #[test]
    fn active_wait_with_noop_delay() {
        let clock = MockClock::new(0);
        let mut backend = ActiveWait::new(MockHousekeeping::default(), MockNoop::new());
        let mut wdt = WatchdogSupervisor::new(MockWatchdogTimer::new(&clock));

        let report = backend
            .sleep(plan(0, false), &PowerConfig::new(), &mut wdt, None)
            .unwrap();
        assert_eq!(report.requested_ms, 1);

        let report = backend
            .sleep(plan(0, true), &PowerConfig::new(), &mut wdt, Some(observe))
            .unwrap();
        assert_eq!(report.requested_ms, 0);
        assert_eq!(backend.housekeeping().yields, 1);
        assert!(observed().is_empty());

        backend.idle();
        assert_eq!(backend.housekeeping().yields, 2);
    }
}
