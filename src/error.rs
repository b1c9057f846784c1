//! Error types shared by the scheduler core and the platform layers

use core::fmt;

use ufmt::derive::uDebug;

/// Sleep entry failures. Never fatal: the scheduler falls back to an idle yield.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepError {
    /// The hardware refused the sleep request.
    Rejected,
    /// No timer wake source could be armed for the requested duration.
    WakeSourceUnavailable,
}

impl fmt::Display for SleepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepError::Rejected => write!(f, "sleep request rejected by hardware"),
            SleepError::WakeSourceUnavailable => write!(f, "timer wake source unavailable"),
        }
    }
}

/// Invalid [`crate::config::PowerConfig`] values.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    DriftCompensationOutOfRange,
    ZeroActiveWaitSlice,
    ThresholdBelowBuffer,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DriftCompensationOutOfRange => {
                write!(f, "drift compensation must be below 1000 per mille")
            }
            ConfigError::ZeroActiveWaitSlice => write!(f, "active wait slice must be non-zero"),
            ConfigError::ThresholdBelowBuffer => {
                write!(f, "deep sleep threshold is below the buffer time")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            SleepError::Rejected.to_string(),
            "sleep request rejected by hardware"
        );
        assert_eq!(
            ConfigError::ZeroActiveWaitSlice.to_string(),
            "active wait slice must be non-zero"
        );
    }
}
