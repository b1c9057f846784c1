//! Read-only view of the external task queue

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};

use crate::platform::Clock;

/// What the power core needs from the task queue.
///
/// Both reads take a [`CriticalSection`] token: interrupt handlers may enqueue at
/// any time, so the queue head is only read with interrupts masked.
pub trait TaskQueue {
    fn is_empty(&self, cs: CriticalSection<'_>) -> bool;

    /// Scheduled uptime of the earliest-due task. Meaningless when empty.
    fn peek_earliest_wake_time(&self, cs: CriticalSection<'_>) -> u64;
}

/// Queue head and current time read together under one critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_ms: u64,
    /// `None` when the queue is empty.
    pub earliest_wake_ms: Option<u64>,
}

impl QueueSnapshot {
    pub fn take<Q, C>(queue: &Q, clock: &C) -> Self
    where
        Q: TaskQueue + ?Sized,
        C: Clock + ?Sized,
    {
        critical_section::with(|cs| Self::read(cs, queue, clock))
    }

    /// Same as [`QueueSnapshot::take`] inside a critical section the caller holds.
    pub fn read<Q, C>(cs: CriticalSection<'_>, queue: &Q, clock: &C) -> Self
    where
        Q: TaskQueue + ?Sized,
        C: Clock + ?Sized,
    {
        let earliest_wake_ms = if queue.is_empty(cs) {
            None
        } else {
            Some(queue.peek_earliest_wake_time(cs))
        };
        Self {
            now_ms: clock.now_ms(),
            earliest_wake_ms,
        }
    }

    pub fn queue_empty(&self) -> bool {
        self.earliest_wake_ms.is_none()
    }

    /// Milliseconds until the earliest task is due; 0 when due or empty.
    pub fn wait_ms(&self) -> u64 {
        self.earliest_wake_ms
            .map_or(0, |wake| wake.saturating_sub(self.now_ms))
    }
}

/// Interrupt-safe single-slot queue head.
///
/// Producers (including interrupt handlers) post wake times; the slot keeps the
/// earliest one until the dispatcher takes it.
pub struct WakeSlot {
    wake_ms: Mutex<Cell<Option<u64>>>,
}

impl WakeSlot {
    pub const fn new() -> Self {
        Self {
            wake_ms: Mutex::new(Cell::new(None)),
        }
    }

    /// Requests a wake at `at_ms`; an earlier pending request wins.
    pub fn schedule_at(&self, at_ms: u64) {
        critical_section::with(|cs| {
            let slot = self.wake_ms.borrow(cs);
            let next = match slot.get() {
                Some(pending) if pending <= at_ms => pending,
                _ => at_ms,
            };
            slot.set(Some(next));
        });
    }

    /// Requests an immediate wake.
    pub fn schedule_now(&self) {
        self.schedule_at(0);
    }

    /// Empties the slot if its wake time has come. Returns whether it did.
    pub fn take_due(&self, now_ms: u64) -> bool {
        critical_section::with(|cs| {
            let slot = self.wake_ms.borrow(cs);
            match slot.get() {
                Some(wake) if wake <= now_ms => {
                    slot.set(None);
                    true
                }
                _ => false,
            }
        })
    }

    pub fn clear(&self) {
        critical_section::with(|cs| self.wake_ms.borrow(cs).set(None));
    }

    pub fn pending(&self, cs: CriticalSection<'_>) -> Option<u64> {
        self.wake_ms.borrow(cs).get()
    }
}

impl Default for WakeSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue for WakeSlot {
    fn is_empty(&self, cs: CriticalSection<'_>) -> bool {
        self.pending(cs).is_none()
    }

    fn peek_earliest_wake_time(&self, cs: CriticalSection<'_>) -> u64 {
        self.pending(cs).unwrap_or(0)
    }
}
