// THEORY:
// A `Mailbox` is a single-slot, latest-value handoff between two tasks. Posting
// never waits: a new value replaces whatever is still undelivered and the
// displaced value is handed back so the caller can count the drop. Receiving is
// either a non-blocking `try_take` or an async `recv` that parks on a tokio
// `Notify` until something arrives or the mailbox is closed.
//
// This is the whole backpressure story for the frame path: there is never more
// than one stale frame waiting anywhere.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Stores `value`, returning the undelivered value it replaced.
    pub fn post(&self, value: T) -> Option<T> {
        let displaced = self.slot.lock().replace(value);
        self.notify.notify_one();
        displaced
    }

    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Waits for a value. Returns `None` once the mailbox is closed and empty.
    pub async fn recv(&self) -> Option<T> {
        loop {
            // Register before checking so a close between the check and the
            // await still wakes this waiter.
            let notified = self.notify.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_take() {
                return Some(value);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Wakes every waiter; values already posted can still be taken.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
