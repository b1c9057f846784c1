//! Scheduler time base

use core::cell::Cell;

use crate::platform::Clock;

/// Wraps a platform clock so readings never go backwards.
///
/// Slow-clock counters are assembled from a software overflow count and a
/// hardware register, and a reading taken across a sleep transition can land
/// just behind the previous one.
pub struct MonotonicClock<C> {
    inner: C,
    last_ms: Cell<u64>,
}

impl<C: Clock> MonotonicClock<C> {
    pub const fn new(inner: C) -> Self {
        Self {
            inner,
            last_ms: Cell::new(0),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Clock> Clock for MonotonicClock<C> {
    fn now_ms(&self) -> u64 {
        let now = self.inner.now_ms().max(self.last_ms.get());
        self.last_ms.set(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockClock;

    #[test]
    fn never_goes_backwards() {
        let raw = MockClock::new(1_000);
        let clock = MonotonicClock::new(&raw);
        assert_eq!(clock.now_ms(), 1_000);

        raw.set(990);
        assert_eq!(clock.now_ms(), 1_000);

        raw.set(1_500);
        assert_eq!(clock.now_ms(), 1_500);
    }
}
