#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

//! Power-management and watchdog core for the cooperative ATmega128 scheduler.
//!
//! Between tasks the dispatcher calls [`rtos::PowerScheduler::on_idle`], which decides
//! whether the CPU stays awake, yields, or sleeps, and keeps the task watchdog armed
//! around it. Hardware drivers live in [`hal`] and only build for AVR targets; the rest
//! is target independent and runs on the host against [`platform::mock`].

mod fmt;

pub mod config;
pub mod error;
pub mod platform;
pub mod rtos;

#[cfg(target_arch = "avr")]
pub mod hal;

pub use config::PowerConfig;
pub use error::{ConfigError, SleepError};
pub use rtos::{
    BeforeSleepFn, PowerScheduler, SleepMethod, SleepMode, SupervisionHook, WakeSlot,
    WatchdogSupervisor, WatchdogTimeout,
};
