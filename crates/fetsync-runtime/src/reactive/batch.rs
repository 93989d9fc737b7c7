#![forbid(unsafe_code)]

//! Batch coalescing for [`Observable`](super::Observable) notifications.
//!
//! A navigation touches the explanation channel several times in a row
//! (lock, purge, re-arm). Inside a [`BatchScope`] values still update
//! immediately, but each subscriber is notified once, with the final value,
//! when the outermost scope closes.
//!
//! ```
//! use fetsync_runtime::reactive::{BatchScope, Observable};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let revision = Observable::new(0_u64);
//! let calls = Rc::new(Cell::new(0));
//! let calls_cb = Rc::clone(&calls);
//! let _sub = revision.subscribe(move |_| calls_cb.set(calls_cb.get() + 1));
//!
//! {
//!     let _batch = BatchScope::new();
//!     revision.set(1);
//!     revision.set(2);
//!     revision.set(3);
//! }
//! assert_eq!(calls.get(), 1);
//! ```
//!
//! Nested scopes only flush at the outermost one. Deferred notifications run
//! in the order their subscriber was first touched. A panicking subscriber
//! does not stop the others; the first panic resumes after the flush.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use tracing::trace;

pub(crate) type Notify = Box<dyn FnOnce()>;

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
    /// Pending notifications keyed by subscriber identity.
    static QUEUE: RefCell<Vec<(usize, Notify)>> = const { RefCell::new(Vec::new()) };
}

/// Whether a [`BatchScope`] is open on this thread.
pub fn is_batching() -> bool {
    DEPTH.with(Cell::get) > 0
}

/// Queue `notify` under `subscriber` if a batch is open.
///
/// A second notification for the same subscriber replaces the first in
/// place. Outside a batch the notification is handed back to the caller.
pub(crate) fn defer(subscriber: usize, notify: Notify) -> Option<Notify> {
    if !is_batching() {
        return Some(notify);
    }
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        match queue.iter_mut().find(|(key, _)| *key == subscriber) {
            Some(slot) => slot.1 = notify,
            None => queue.push((subscriber, notify)),
        }
    });
    None
}

fn queued() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// RAII guard opening a batch.
pub struct BatchScope {
    depth: u32,
}

impl BatchScope {
    #[must_use]
    pub fn new() -> Self {
        let depth = DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        Self { depth }
    }

    /// Notifications waiting for the outermost scope to close.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        queued()
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let remaining = DEPTH.with(|d| {
            let next = d.get().saturating_sub(1);
            d.set(next);
            next
        });
        if remaining > 0 {
            return;
        }

        // Drained before running: a subscriber that sets another observable
        // is outside any batch and notifies directly.
        let pending = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
        if pending.is_empty() {
            return;
        }
        trace!(notifications = pending.len(), "batch closed");

        let mut first_panic = None;
        for (_, notify) in pending {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(notify)) {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &self.depth)
            .field("pending", &queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Observable, Subscription};
    use std::rc::Rc;

    fn record(obs: &Observable<u64>) -> (Rc<RefCell<Vec<u64>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = obs.subscribe(move |v| sink.borrow_mut().push(*v));
        (seen, sub)
    }

    #[test]
    fn lock_purge_rearm_notifies_once_with_final_revision() {
        let revision = Observable::new(0_u64);
        let (seen, _sub) = record(&revision);

        {
            let batch = BatchScope::new();
            revision.set(1);
            revision.set(2);
            revision.set(3);
            assert!(seen.borrow().is_empty());
            assert_eq!(revision.get(), 3);
            assert_eq!(batch.pending_count(), 1);
        }
        assert_eq!(*seen.borrow(), vec![3]);
        assert!(!is_batching());
    }

    #[test]
    fn inner_scope_does_not_flush() {
        let revision = Observable::new(0_u64);
        let (seen, _sub) = record(&revision);

        {
            let _outer = BatchScope::new();
            {
                let _inner = BatchScope::new();
                revision.set(7);
            }
            assert!(seen.borrow().is_empty());
            revision.set(8);
        }
        assert_eq!(*seen.borrow(), vec![8]);
    }

    #[test]
    fn defer_hands_back_outside_a_batch() {
        assert!(defer(1, Box::new(|| {})).is_some());
        let _batch = BatchScope::new();
        assert!(defer(1, Box::new(|| {})).is_none());
    }

    #[test]
    fn replaced_notification_keeps_its_slot() {
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let _batch = BatchScope::new();
            for (key, label) in [(1, "a-old"), (2, "b"), (1, "a-new")] {
                let order = Rc::clone(&order);
                let handed_back = defer(key, Box::new(move || order.borrow_mut().push(label)));
                assert!(handed_back.is_none());
            }
        }
        assert_eq!(*order.borrow(), vec!["a-new", "b"]);
    }

    #[test]
    fn subscriber_writing_another_observable_notifies_directly() {
        let channel = Observable::new(0_u64);
        let display = Observable::new(0_u64);
        let (display_seen, _display_sub) = record(&display);
        let display_cb = display.clone();
        let _sub = channel.subscribe(move |v| { display_cb.set(*v * 10); });

        {
            let _batch = BatchScope::new();
            channel.set(4);
        }
        assert_eq!(*display_seen.borrow(), vec![40]);
    }
}
