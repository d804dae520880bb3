//! Single-slot hand-off cell.
//!
//! Writers overwrite whatever is pending; the reader only ever sees the
//! latest value. Every `put` returns a ticket so a writer can later tell
//! whether the reader has caught up with it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    seq: u64,
}

/// Latest-wins mailbox for many writers and one reader.
#[derive(Debug)]
pub struct HandOff<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Default for HandOff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandOff<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                seq: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Store `value`, discarding any pending one. Returns its ticket.
    pub fn put(&self, value: T) -> u64 {
        let mut slot = self.lock();
        slot.seq += 1;
        slot.value = Some(value);
        let ticket = slot.seq;
        drop(slot);
        self.ready.notify_one();
        ticket
    }

    /// Take the pending value without waiting.
    pub fn try_take(&self) -> Option<(u64, T)> {
        let mut slot = self.lock();
        let seq = slot.seq;
        slot.value.take().map(|value| (seq, value))
    }

    /// Take the pending value, waiting at most `timeout` for one to arrive.
    pub fn take_timeout(&self, timeout: Duration) -> Option<(u64, T)> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.value.take() {
                return Some((slot.seq, value));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
