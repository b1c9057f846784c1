//! Idle-path power management for the cooperative scheduler

pub mod clock;
pub mod decision;
pub mod executor;
pub mod queue;
pub mod scheduler;
pub mod watchdog;

pub use clock::MonotonicClock;
pub use decision::{evaluate, Decision, DecisionInput, SleepMode};
pub use executor::{
    compensate_drift, ActiveWait, BeforeSleepFn, HardwareSleep, SleepBackend, SleepMethod,
    SleepPlan, SleepReport,
};
pub use queue::{QueueSnapshot, TaskQueue, WakeSlot};
pub use scheduler::{IdleOutcome, NoIndicator, PowerScheduler};
pub use watchdog::{SupervisionFn, SupervisionHook, WatchdogSupervisor, WatchdogTimeout};
