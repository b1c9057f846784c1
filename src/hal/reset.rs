use avr_device::atmega128a::CPU;
use ufmt::derive::uDebug;

// MCUCSR
const JTRF: u8 = 1 << 4;
const WDRF: u8 = 1 << 3;
const BORF: u8 = 1 << 2;
const EXTRF: u8 = 1 << 1;
const PORF: u8 = 1 << 0;

/// Why the chip last came out of reset.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    PowerOn,
    External,
    BrownOut,
    /// Also the result of a task watchdog expiry or a forced reset.
    Watchdog,
    Jtag,
    Unknown,
}

impl ResetCause {
    /// Reads and clears the reset flags. Call once, early in `main`.
    pub fn take() -> Self {
        let flags = unsafe {
            let p = CPU::ptr();
            let flags = (*p).mcucsr.read().bits();
            (*p).mcucsr.modify(|r, w| w.bits(r.bits() & !(JTRF | WDRF | BORF | EXTRF | PORF)));
            flags
        };
        Self::from_flags(flags)
    }

    pub const fn from_flags(flags: u8) -> Self {
        if flags & PORF != 0 {
            Self::PowerOn
        } else if flags & WDRF != 0 {
            Self::Watchdog
        } else if flags & BORF != 0 {
            Self::BrownOut
        } else if flags & EXTRF != 0 {
            Self::External
        } else if flags & JTRF != 0 {
            Self::Jtag
        } else {
            Self::Unknown
        }
    }
}
