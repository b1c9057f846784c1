//! Idle-path power scheduler
//!
//! One [`PowerScheduler`] owns everything the idle path mutates: the watchdog
//! handle, the before-sleep callback, the last-finished timestamp and the
//! no-sleep locks. The dispatcher runs tasks through [`PowerScheduler::run_task`]
//! and calls [`PowerScheduler::on_idle`] whenever nothing is runnable.

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;

use super::decision::{self, Decision, DecisionInput, SleepMode};
use super::executor::{BeforeSleepFn, SleepBackend, SleepPlan, SleepReport};
use super::queue::{QueueSnapshot, TaskQueue};
use super::watchdog::{SupervisionFn, SupervisionHook, WatchdogSupervisor, WatchdogTimeout};
use crate::config::PowerConfig;
use crate::error::ConfigError;
use crate::platform::{Clock, WatchdogTimer};

/// Stand-in when no awake indicator pin is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl OutputPin for NoIndicator {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Result of one idle cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleOutcome {
    pub mode: SleepMode,
    /// Set when a sleep was actually entered.
    pub report: Option<SleepReport>,
}

pub struct PowerScheduler<'q, Q: ?Sized, C, W: WatchdogTimer, B, P = NoIndicator> {
    queue: &'q Q,
    clock: C,
    watchdog: WatchdogSupervisor<W>,
    backend: B,
    indicator: P,
    config: PowerConfig,
    task_timeout: WatchdogTimeout,
    last_task_finished_ms: u64,
    no_sleep_locks: u8,
    before_sleep: Option<BeforeSleepFn>,
}

impl<'q, Q, C, W, B> PowerScheduler<'q, Q, C, W, B, NoIndicator>
where
    Q: TaskQueue + ?Sized,
    C: Clock,
    W: WatchdogTimer,
    B: SleepBackend,
{
    pub fn new(
        queue: &'q Q,
        clock: C,
        watchdog_timer: W,
        backend: B,
        config: PowerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            queue,
            clock,
            watchdog: WatchdogSupervisor::new(watchdog_timer),
            backend,
            indicator: NoIndicator,
            task_timeout: config.task_timeout,
            config,
            last_task_finished_ms: 0,
            no_sleep_locks: 0,
            before_sleep: None,
        })
    }
}

impl<'q, Q, C, W, B, P> PowerScheduler<'q, Q, C, W, B, P>
where
    Q: TaskQueue + ?Sized,
    C: Clock,
    W: WatchdogTimer,
    B: SleepBackend,
    P: OutputPin,
{
    /// Drives `pin` HIGH while awake and LOW while idling or asleep.
    pub fn with_indicator<P2: OutputPin>(self, mut pin: P2) -> PowerScheduler<'q, Q, C, W, B, P2> {
        pin.set_high().ok();
        PowerScheduler {
            queue: self.queue,
            clock: self.clock,
            watchdog: self.watchdog,
            backend: self.backend,
            indicator: pin,
            config: self.config,
            task_timeout: self.task_timeout,
            last_task_finished_ms: self.last_task_finished_ms,
            no_sleep_locks: self.no_sleep_locks,
            before_sleep: self.before_sleep,
        }
    }

    pub fn set_before_sleep_callback(&mut self, callback: BeforeSleepFn) {
        self.before_sleep = Some(callback);
    }

    /// Registers the callback run on watchdog expiry, bounded by the configured
    /// supervision callback timeout.
    pub fn set_supervision_callback(&self, hook: &SupervisionHook, callback: SupervisionFn) {
        hook.set(callback, self.config.supervision_callback_timeout);
    }

    /// Arms task supervision with the configured timeout.
    pub fn start(&mut self) {
        if self.task_timeout != WatchdogTimeout::NoSupervision {
            self.watchdog.enable(self.task_timeout);
        }
        info!("power scheduler started, task timeout {:?}", self.task_timeout);
    }

    /// Timeout armed by [`start`](Self::start) and [`reactivate_watchdog`](Self::reactivate_watchdog).
    pub fn set_task_timeout(&mut self, timeout: WatchdogTimeout) {
        self.task_timeout = timeout;
    }

    pub fn task_timeout(&self) -> WatchdogTimeout {
        self.task_timeout
    }

    pub fn watchdog_enable(&mut self, selection: WatchdogTimeout) {
        self.watchdog.enable(selection);
    }

    pub fn watchdog_disable(&mut self) {
        self.watchdog.disable();
    }

    pub fn watchdog_feed(&mut self) {
        self.watchdog.reset();
    }

    /// Prevents sleep until the matching release. Saturates at 255 locks.
    pub fn acquire_no_sleep_lock(&mut self) {
        self.no_sleep_locks = self.no_sleep_locks.saturating_add(1);
    }

    pub fn release_no_sleep_lock(&mut self) {
        self.no_sleep_locks = self.no_sleep_locks.saturating_sub(1);
    }

    /// Whether no no-sleep lock is held.
    pub fn does_sleep(&self) -> bool {
        self.no_sleep_locks == 0
    }

    /// Runs one task under the watchdog and records when it finished.
    pub fn run_task<R>(&mut self, task: impl FnOnce() -> R) -> R {
        self.watchdog.reset();
        let result = task();
        self.watchdog.reset();
        self.task_finished();
        result
    }

    /// Records a task completion for dispatchers that run tasks themselves.
    pub fn task_finished(&mut self) {
        self.last_task_finished_ms = self.clock.now_ms();
    }

    pub fn last_task_finished_ms(&self) -> u64 {
        self.last_task_finished_ms
    }

    /// Classifies the current moment without acting on it.
    pub fn evaluate(&self) -> Decision {
        let last_task_finished_ms = self.last_task_finished_ms;
        let sleep_locked = !self.does_sleep();
        critical_section::with(|cs| {
            let input = DecisionInput {
                snapshot: QueueSnapshot::read(cs, self.queue, &self.clock),
                last_task_finished_ms,
                sleep_locked,
            };
            decision::evaluate(&input, &self.config)
        })
    }

    /// Idle entry point: decide, idle or sleep, then restore the watchdog to the
    /// state it was in on entry.
    pub fn on_idle(&mut self) -> IdleOutcome {
        let decision = self.evaluate();
        let armed = self.watchdog.selection();
        let report = match decision.mode {
            SleepMode::NoSleep => {
                return IdleOutcome {
                    mode: SleepMode::NoSleep,
                    report: None,
                }
            }
            SleepMode::Idle => {
                self.indicator.set_low().ok();
                self.backend.idle();
                None
            }
            SleepMode::Sleep => {
                self.indicator.set_low().ok();
                self.enter_sleep()
            }
        };

        self.indicator.set_high().ok();
        self.restore_watchdog(armed);
        IdleOutcome {
            mode: decision.mode,
            report,
        }
    }

    /// Feeds and re-arms with the task timeout, or disarms without supervision.
    pub fn reactivate_watchdog(&mut self) {
        match self.task_timeout {
            WatchdogTimeout::NoSupervision => self.watchdog.disable(),
            timeout => {
                self.watchdog.reset();
                self.watchdog.enable(timeout);
            }
        }
    }

    fn restore_watchdog(&mut self, armed: Option<WatchdogTimeout>) {
        match armed {
            Some(selection) => {
                self.watchdog.reset();
                self.watchdog.enable(selection);
            }
            None => self.watchdog.disable(),
        }
    }

    fn enter_sleep(&mut self) -> Option<SleepReport> {
        self.watchdog.disable();

        // re-read: an interrupt may have queued an earlier task since the decision
        let snapshot = QueueSnapshot::take(self.queue, &self.clock);
        let plan = SleepPlan {
            wait_ms: snapshot.wait_ms(),
            queue_empty: snapshot.queue_empty(),
        };

        match self
            .backend
            .sleep(plan, &self.config, &mut self.watchdog, self.before_sleep)
        {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("sleep entry failed ({:?}), idling instead", e);
                self.backend.idle();
                None
            }
        }
    }

    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn watchdog(&self) -> &WatchdogSupervisor<W> {
        &self.watchdog
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn indicator_mut(&mut self) -> &mut P {
        &mut self.indicator
    }
}
