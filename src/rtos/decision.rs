//! Sleep mode decision engine
//!
//! A pure function of the queue snapshot, the last task finish time and the
//! configuration; nothing is remembered between idle cycles.

use ufmt::derive::uDebug;

use super::queue::QueueSnapshot;
use crate::config::PowerConfig;

/// What the idle path should do this cycle.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepMode {
    /// A task is due; return to the dispatcher right away.
    NoSleep,
    /// Yield once and re-evaluate.
    Idle,
    /// Enter a hardware sleep state.
    Sleep,
}

/// Inputs besides the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionInput {
    pub snapshot: QueueSnapshot,
    pub last_task_finished_ms: u64,
    /// A no-sleep lock is held.
    pub sleep_locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub mode: SleepMode,
    /// Time until the earliest task; 0 with an empty queue means no known bound.
    pub wait_ms: u64,
    pub queue_empty: bool,
}

pub fn evaluate(input: &DecisionInput, config: &PowerConfig) -> Decision {
    let snapshot = &input.snapshot;
    let now = snapshot.now_ms;
    let can_sleep = config.sleep_enabled && !input.sleep_locked;
    let cooling_down = config.cooling_down(now, input.last_task_finished_ms);

    let Some(earliest) = snapshot.earliest_wake_ms else {
        let mode = if can_sleep && !cooling_down {
            SleepMode::Sleep
        } else {
            SleepMode::Idle
        };
        return Decision {
            mode,
            wait_ms: 0,
            queue_empty: true,
        };
    };

    let wait_ms = earliest.saturating_sub(now);
    let mode = if wait_ms == 0 {
        SleepMode::NoSleep
    } else if !can_sleep || wait_ms < config.buffer_time_ms || cooling_down {
        SleepMode::Idle
    } else {
        SleepMode::Sleep
    };

    Decision {
        mode,
        wait_ms,
        queue_empty: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(now_ms: u64, earliest_wake_ms: Option<u64>) -> DecisionInput {
        DecisionInput {
            snapshot: QueueSnapshot {
                now_ms,
                earliest_wake_ms,
            },
            last_task_finished_ms: 0,
            sleep_locked: false,
        }
    }

    #[test]
    fn due_task_never_sleeps() {
        let configs = [
            PowerConfig::new(),
            PowerConfig::new().sleep_enabled(false),
            PowerConfig::new().sleep_delay(1_000).buffer_time(100),
        ];
        for config in configs.iter() {
            for (now, wake) in [(0, 0), (500, 500), (500, 10), (u64::MAX, 3)] {
                let decision = evaluate(&input(now, Some(wake)), config);
                assert_eq!(decision.mode, SleepMode::NoSleep);
                assert_eq!(decision.wait_ms, 0);
            }
        }
    }

    #[test]
    fn waits_below_buffer_idle() {
        let config = PowerConfig::new().buffer_time(100);
        for wait in 1..100 {
            let decision = evaluate(&input(1_000, Some(1_000 + wait)), &config);
            assert_eq!(decision.mode, SleepMode::Idle, "wait {}", wait);
        }
    }

    #[test]
    fn waits_at_or_above_buffer_sleep() {
        let config = PowerConfig::new().buffer_time(100);
        for wait in [100, 101, 5_000, 30_000, u64::MAX / 2] {
            let decision = evaluate(&input(7, Some(7 + wait)), &config);
            assert_eq!(decision.mode, SleepMode::Sleep);
            assert_eq!(decision.wait_ms, wait);
            assert!(!decision.queue_empty);
        }
    }

    #[test]
    fn task_due_in_50ms_with_100ms_buffer_idles() {
        let config = PowerConfig::new().buffer_time(100);
        let decision = evaluate(&input(2_000, Some(2_050)), &config);
        assert_eq!(decision.mode, SleepMode::Idle);
    }

    #[test]
    fn empty_queue_sleeps_without_bound() {
        let decision = evaluate(&input(123, None), &PowerConfig::new());
        assert_eq!(
            decision,
            Decision {
                mode: SleepMode::Sleep,
                wait_ms: 0,
                queue_empty: true,
            }
        );
    }

    #[test]
    fn empty_queue_idles_without_sleep_support() {
        let decision = evaluate(&input(123, None), &PowerConfig::new().sleep_enabled(false));
        assert_eq!(decision.mode, SleepMode::Idle);
    }

    #[test]
    fn sleep_lock_forces_idle() {
        let mut locked = input(0, Some(5_000));
        locked.sleep_locked = true;
        assert_eq!(evaluate(&locked, &PowerConfig::new()).mode, SleepMode::Idle);

        let mut locked_empty = input(0, None);
        locked_empty.sleep_locked = true;
        assert_eq!(evaluate(&locked_empty, &PowerConfig::new()).mode, SleepMode::Idle);
    }

    #[test]
    fn cooldown_delays_sleep() {
        let config = PowerConfig::new().sleep_delay(500);
        let mut recent = input(1_200, Some(10_000));
        recent.last_task_finished_ms = 1_000;
        assert_eq!(evaluate(&recent, &config).mode, SleepMode::Idle);

        let mut empty = input(1_200, None);
        empty.last_task_finished_ms = 1_000;
        assert_eq!(evaluate(&empty, &config).mode, SleepMode::Idle);

        recent.snapshot.now_ms = 1_500;
        empty.snapshot.now_ms = 1_500;
        assert_eq!(evaluate(&recent, &config).mode, SleepMode::Sleep);
        assert_eq!(evaluate(&empty, &config).mode, SleepMode::Sleep);
    }
}
