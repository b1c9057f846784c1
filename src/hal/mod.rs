//! ATmega128 drivers behind the platform traits
//!
//! Two profiles share these drivers. The RTC profile needs the 32.768 kHz crystal
//! on TOSC1/TOSC2: [`RtcClock`] + [`RtcSleep`] + [`TimerWatchdog`]. The uptime
//! profile runs without it: [`UptimeClock`] + [`BusyDelay`] + [`NativeWatchdog`],
//! driven through `rtos::ActiveWait`.

pub mod gpio;
pub mod power;
pub mod reset;
pub mod rtc;
pub mod timer;
pub mod uart;
pub mod watchdog;

pub use gpio::{board, Input, Output, Pin};
pub use power::{Power, RtcSleep, SleepState};
pub use reset::ResetCause;
pub use rtc::RtcClock;
pub use timer::{BusyDelay, UptimeClock};
pub use uart::Uart;
pub use watchdog::{AvrReset, NativeWatchdog, TimerWatchdog, SUPERVISION};
