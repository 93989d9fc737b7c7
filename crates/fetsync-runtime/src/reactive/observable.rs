#![forbid(unsafe_code)]

//! Shared value with change notification.
//!
//! The engine publishes display text through an `Observable<String>` and the
//! channel revision through an `Observable<u64>`. Two properties matter:
//!
//! - setting an equal value is a no-op (no version bump, no notification),
//!   so repeated identical resolutions are invisible downstream;
//! - [`Observable::subscribe_current`] hands a new subscriber the latest
//!   value once, never a replay of earlier values.
//!
//! Subscribers are held weakly and fire in registration order. Dropping the
//! [`Subscription`] guard detaches the callback; its slot is pruned on the
//! next notification.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug_span, trace};
use web_time::Instant;

use super::batch;

type Callback<T> = dyn Fn(&T);

struct Slot<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// Version-tracked shared value. Clones are handles to the same value.
pub struct Observable<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Observable")
            .field("value", &slot.value)
            .field("version", &slot.version)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.slot.borrow().value.clone()
    }

    /// Replace the value. Returns `true` if it differed from the old one.
    ///
    /// May be called from inside a subscriber callback.
    pub fn set(&self, value: T) -> bool {
        {
            let mut slot = self.slot.borrow_mut();
            if slot.value == value {
                return false;
            }
            slot.value = value;
            slot.version += 1;
        }
        self.notify();
        true
    }

    /// Mutate in place; notifies only if the result differs.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Call `callback` on every change until the guard is dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.slot
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Deliver the current value right away, then every change.
    pub fn subscribe_current(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        callback(&self.get());
        self.subscribe(callback)
    }

    /// Number of value-changing writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.slot.borrow().version
    }

    /// Live plus not-yet-pruned subscriber slots.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.slot.borrow().subscribers.len()
    }

    fn notify(&self) {
        let live: Vec<Rc<Callback<T>>> = {
            let mut slot = self.slot.borrow_mut();
            slot.subscribers.retain(|w| w.strong_count() > 0);
            slot.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        if live.is_empty() {
            return;
        }

        if batch::is_batching() {
            // Deferred per subscriber; the flush reads whatever is latest.
            for callback in live {
                let identity = Rc::as_ptr(&callback).cast::<()>() as usize;
                let source = self.clone();
                let notify = Box::new(move || callback(&source.get()));
                // `defer` hands the notification back when no batch is open.
                if let Some(notify) = batch::defer(identity, notify) {
                    notify();
                }
            }
            return;
        }

        let value = self.get();
        let started = Instant::now();
        let span = debug_span!(
            "fetsync.notify",
            subscribers = live.len(),
            duration_us = tracing::field::Empty
        );
        let _guard = span.enter();
        for callback in &live {
            callback(&value);
        }
        let duration_us = started.elapsed().as_micros() as u64;
        span.record("duration_us", duration_us);
        trace!(duration_us, "subscribers notified");
    }
}

/// Keeps a subscriber callback alive.
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
