//! Write-once result cell: the cross-thread handoff structure.
//!
//! Every handoff in the bridge (a pending call's outcome, a foreign
//! future's delivery) goes through exactly one [`ResultCell`]. The cell is
//! the only structure shared across threads, and it is single-writer by
//! construction: whoever holds the write right calls [`fulfill`] once.
//!
//! Both wait styles are supported, because consumers live on both sides of
//! the sync/async boundary:
//!
//! - blocking wait (external thread): parking_lot mutex + condvar
//! - async wait (inside a cooperative loop): tokio `Notify` in permit mode
//!
//! A second fulfilment is an invariant violation in the bridge core. It is
//! reported loudly via `tracing::error!` and the first value is kept, so
//! the consumer never observes corruption.
//!
//! [`fulfill`]: ResultCell::fulfill

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Result of a take attempt on the cell.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TakeError {
    /// No value has been delivered yet.
    Empty,
    /// The value was delivered and already taken by an earlier wait.
    Consumed,
}

enum Slot<V> {
    Empty,
    Ready(V),
    Taken,
}

/// A single-slot, write-once, take-once cell with blocking and async waits.
///
/// At most one consumer should wait at a time; the handle types built on
/// top of this enforce that by construction or document it as a caller
/// error. A late second taker gets [`TakeError::Consumed`], never a value
/// and never a hang on an already-decided cell.
pub(crate) struct ResultCell<V> {
    slot: Mutex<Slot<V>>,
    cond: Condvar,
    notify: Notify,
}

impl<V> ResultCell<V> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            cond: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Delivers the value. Returns `false` (and reports the defect) if the
    /// cell was already fulfilled; the original value is kept.
    pub(crate) fn fulfill(&self, value: V) -> bool {
        {
            let mut slot = self.slot.lock();
            match *slot {
                Slot::Empty => *slot = Slot::Ready(value),
                Slot::Ready(_) | Slot::Taken => {
                    drop(slot);
                    tracing::error!(
                        "result cell double fulfilment: write-once invariant broken"
                    );
                    return false;
                }
            }
        }
        self.cond.notify_all();
        // notify_one stores a permit, so an async waiter that checks the
        // slot just before this line still wakes.
        self.notify.notify_one();
        true
    }

    /// Returns whether a value has been delivered (taken or not).
    pub(crate) fn is_fulfilled(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Empty)
    }

    fn try_take(&self) -> Result<V, TakeError> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(v) => Ok(v),
            Slot::Empty => {
                *slot = Slot::Empty;
                Err(TakeError::Empty)
            }
            Slot::Taken => Err(TakeError::Consumed),
        }
    }

    /// Async wait. Resolves once the value is delivered, or with
    /// [`TakeError::Consumed`] if an earlier wait already took it.
    pub(crate) async fn wait(&self) -> Result<V, TakeError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a fulfil landing
            // between the check and the await cannot be missed.
            notified.as_mut().enable();

            match self.try_take() {
                Ok(v) => return Ok(v),
                Err(TakeError::Consumed) => return Err(TakeError::Consumed),
                Err(TakeError::Empty) => {}
            }

            notified.await;
        }
    }

    /// Blocking wait with an optional bound.
    ///
    /// `Err(TakeError::Empty)` means the timeout elapsed with no delivery;
    /// the cell is untouched and a later wait may still succeed.
    pub(crate) fn wait_blocking(&self, timeout: Option<Duration>) -> Result<V, TakeError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Ready(v) => return Ok(v),
                Slot::Taken => return Err(TakeError::Consumed),
                Slot::Empty => *slot = Slot::Empty,
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TakeError::Empty);
                    }
                    if self.cond.wait_for(&mut slot, deadline - now).timed_out() {
                        // Re-check the slot once more before giving up.
                        match std::mem::replace(&mut *slot, Slot::Taken) {
                            Slot::Ready(v) => return Ok(v),
                            Slot::Taken => return Err(TakeError::Consumed),
                            Slot::Empty => {
                                *slot = Slot::Empty;
                                return Err(TakeError::Empty);
                            }
                        }
                    }
                }
                None => self.cond.wait(&mut slot),
            }
        }
    }
}

/// Guard that guarantees a cell is fulfilled even if its owner is dropped
/// without delivering.
///
/// The shutdown race in [`LoopHandle::schedule`] means a scheduled closure
/// can be dropped unrun; any waiter on its cell would then hang forever,
/// the defect class the bridge exists to prevent. Components arm one of
/// these with a fallback outcome and carry it through the closure and the
/// supervisor task; whichever way the closure dies, the waiter resolves.
///
/// [`LoopHandle::schedule`]: crate::event_loop::LoopHandle::schedule
pub(crate) struct FulfillOnDrop<V> {
    inner: Option<(std::sync::Arc<ResultCell<V>>, V)>,
}

impl<V> FulfillOnDrop<V> {
    pub(crate) fn new(cell: std::sync::Arc<ResultCell<V>>, fallback: V) -> Self {
        Self {
            inner: Some((cell, fallback)),
        }
    }

    /// Delivers `value` instead of the fallback and disarms the guard.
    pub(crate) fn fulfill(mut self, value: V) {
        if let Some((cell, _fallback)) = self.inner.take() {
            cell.fulfill(value);
        }
    }
}

impl<V> Drop for FulfillOnDrop<V> {
    fn drop(&mut self) {
        if let Some((cell, fallback)) = self.inner.take() {
            cell.fulfill(fallback);
        }
    }
}
