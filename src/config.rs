//! Configuration constants and initialization-time power settings

use crate::error::ConfigError;
use crate::rtos::WatchdogTimeout;

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// UART baud rate
pub const UART_BAUD: u32 = 9600;

/// Watch crystal driving the asynchronous Timer/Counter0
pub const RTC_CRYSTAL_HZ: u32 = 32_768;

/// Minimum wait in milliseconds for which entering a sleep state pays off
pub const BUFFER_TIME_MS: u64 = 2;

/// Waits strictly above this use deep sleep instead of light sleep
pub const DEEP_SLEEP_THRESHOLD_MS: u64 = 10_000;

/// Deep-sleep shortening in per mille of the requested duration
pub const DRIFT_COMPENSATION_PERMILLE: u16 = 50;

/// Longest single busy wait on targets without hardware sleep
pub const MAX_ACTIVE_WAIT_MS: u64 = 7_000;

/// The watchdog is fed at least this often during a busy wait
pub const ACTIVE_WAIT_SLICE_MS: u32 = 250;

/// Power settings fixed at initialization.
///
/// Build one with struct-update syntax over [`PowerConfig::default`] or with the
/// chained setters, then hand it to [`crate::rtos::PowerScheduler::new`], which
/// validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerConfig {
    /// Whether this build target may enter any sleep state.
    pub sleep_enabled: bool,
    pub buffer_time_ms: u64,
    /// Cool-down after the last finished task before sleep is allowed.
    pub sleep_delay_ms: Option<u64>,
    pub deep_sleep_threshold_ms: u64,
    pub drift_compensation_permille: u16,
    /// An empty queue may put the CPU to sleep with no timer wake source.
    pub allow_indefinite_sleep: bool,
    pub max_active_wait_ms: u64,
    pub active_wait_slice_ms: u32,
    pub task_timeout: WatchdogTimeout,
    /// Upper bound for the supervision callback before the fail-safe reset fires.
    pub supervision_callback_timeout: WatchdogTimeout,
}

impl PowerConfig {
    pub const fn new() -> Self {
        Self {
            sleep_enabled: true,
            buffer_time_ms: BUFFER_TIME_MS,
            sleep_delay_ms: None,
            deep_sleep_threshold_ms: DEEP_SLEEP_THRESHOLD_MS,
            drift_compensation_permille: DRIFT_COMPENSATION_PERMILLE,
            allow_indefinite_sleep: false,
            max_active_wait_ms: MAX_ACTIVE_WAIT_MS,
            active_wait_slice_ms: ACTIVE_WAIT_SLICE_MS,
            task_timeout: WatchdogTimeout::Ms8000,
            supervision_callback_timeout: WatchdogTimeout::Ms1000,
        }
    }

    pub const fn sleep_enabled(mut self, enabled: bool) -> Self {
        self.sleep_enabled = enabled;
        self
    }

    pub const fn buffer_time(mut self, ms: u64) -> Self {
        self.buffer_time_ms = ms;
        self
    }

    pub const fn sleep_delay(mut self, ms: u64) -> Self {
        self.sleep_delay_ms = Some(ms);
        self
    }

    pub const fn deep_sleep_threshold(mut self, ms: u64) -> Self {
        self.deep_sleep_threshold_ms = ms;
        self
    }

    pub const fn drift_compensation(mut self, permille: u16) -> Self {
        self.drift_compensation_permille = permille;
        self
    }

    pub const fn allow_indefinite_sleep(mut self, allow: bool) -> Self {
        self.allow_indefinite_sleep = allow;
        self
    }

    pub const fn max_active_wait(mut self, ms: u64) -> Self {
        self.max_active_wait_ms = ms;
        self
    }

    pub const fn active_wait_slice(mut self, ms: u32) -> Self {
        self.active_wait_slice_ms = ms;
        self
    }

    pub const fn task_timeout(mut self, timeout: WatchdogTimeout) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub const fn supervision_callback_timeout(mut self, timeout: WatchdogTimeout) -> Self {
        self.supervision_callback_timeout = timeout;
        self
    }

    /// Whether the post-task cool-down still blocks sleep at `now_ms`.
    pub fn cooling_down(&self, now_ms: u64, last_task_finished_ms: u64) -> bool {
        match self.sleep_delay_ms {
            Some(delay) => now_ms < last_task_finished_ms.saturating_add(delay),
            None => false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drift_compensation_permille >= 1000 {
            return Err(ConfigError::DriftCompensationOutOfRange);
        }
        if self.active_wait_slice_ms == 0 {
            return Err(ConfigError::ZeroActiveWaitSlice);
        }
        if self.deep_sleep_threshold_ms < self.buffer_time_ms {
            return Err(ConfigError::ThresholdBelowBuffer);
        }
        Ok(())
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self::new()
    }
}
