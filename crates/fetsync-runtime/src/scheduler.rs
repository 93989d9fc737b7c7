#![forbid(unsafe_code)]

//! Tick scheduling and time sources.
//!
//! The engine never touches a real display refresh. It asks a
//! [`TickScheduler`] for "run this on the next render tick" or "run this after
//! N milliseconds", and reads time through the same scheduler. Two
//! implementations share one timer queue:
//!
//! - [`FrameScheduler`]: wall clock ([`MonotonicClock`]); the host calls
//!   [`TimerQueue::poll`] once per frame.
//! - [`VirtualScheduler`]: manual clock ([`ManualClock`]); tests call
//!   [`TimerQueue::advance`] to move time and fire due timers in order.
//!
//! # Ordering
//!
//! Timers fire in `(due_ms, sequence)` order, so two timers due at the same
//! instant fire in scheduling order (FIFO). Timers scheduled while firing
//! that are already due fire in the same `poll`/`advance` call.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use web_time::Instant;

/// Deferred work handed to a scheduler.
pub type TickCallback = Box<dyn FnOnce()>;

/// Identifier of a scheduled timer.
pub type TimerId = u64;

/// Millisecond time source.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin. Never decreases.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Manually driven clock for tests and deterministic replay.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Move time forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now.set(self.now.get().saturating_add(delta_ms));
    }

    /// Jump to `ms`; earlier values are ignored so time stays monotonic.
    pub fn set(&self, ms: u64) {
        if ms > self.now.get() {
            self.now.set(ms);
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Render-tick scheduling seam.
pub trait TickScheduler {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Nominal render-tick period.
    fn frame_interval_ms(&self) -> u64;

    /// Run `callback` once `delay_ms` has elapsed.
    fn schedule_after(&self, delay_ms: u64, callback: TickCallback) -> TimerId;

    /// Run `callback` on the next render tick.
    fn request_tick(&self, callback: TickCallback) -> TimerId {
        self.schedule_after(self.frame_interval_ms(), callback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DueTimer {
    due_ms: u64,
    id: TimerId,
}

impl PartialOrd for DueTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DueTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest due first (BinaryHeap is a max-heap), then FIFO by id.
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<DueTimer>,
    callbacks: HashMap<TimerId, TickCallback>,
    next_id: TimerId,
}

/// Timer queue driven by a [`Clock`].
pub struct TimerQueue<C: Clock> {
    clock: C,
    frame_interval_ms: u64,
    state: RefCell<QueueState>,
    fired: Cell<u64>,
}

/// Wall-clock scheduler polled by the host once per frame.
pub type FrameScheduler = TimerQueue<MonotonicClock>;

/// Virtual-time scheduler for tests.
pub type VirtualScheduler = TimerQueue<ManualClock>;

impl<C: Clock> TimerQueue<C> {
    /// Create a queue reading time from `clock`.
    ///
    /// A zero `frame_interval_ms` is clamped to 1 so that `request_tick`
    /// always lands strictly in the future.
    pub fn with_clock(clock: C, frame_interval_ms: u64) -> Self {
        Self {
            clock,
            frame_interval_ms: frame_interval_ms.max(1),
            state: RefCell::new(QueueState::default()),
            fired: Cell::new(0),
        }
    }

    /// The underlying clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of timers not yet fired.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().callbacks.len()
    }

    /// Total timers fired so far.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired.get()
    }

    /// Due time of the earliest pending timer.
    #[must_use]
    pub fn next_due(&self) -> Option<u64> {
        self.state.borrow().heap.peek().map(|t| t.due_ms)
    }

    /// Fire every timer due at or before the current clock reading.
    ///
    /// Returns the number of callbacks run.
    pub fn poll(&self) -> usize {
        let now = self.clock.now_ms();
        let mut ran = 0;
        while let Some(callback) = self.pop_due(now) {
            callback();
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, limit_ms: u64) -> Option<TickCallback> {
        let mut state = self.state.borrow_mut();
        let next = *state.heap.peek()?;
        if next.due_ms > limit_ms {
            return None;
        }
        state.heap.pop();
        let callback = state.callbacks.remove(&next.id)?;
        self.fired.set(self.fired.get() + 1);
        Some(callback)
    }
}

impl TimerQueue<ManualClock> {
    /// Virtual scheduler starting at `start_ms`.
    #[must_use]
    pub fn new_virtual(start_ms: u64, frame_interval_ms: u64) -> Self {
        Self::with_clock(ManualClock::new(start_ms), frame_interval_ms)
    }

    /// Advance virtual time by `delta_ms`, firing due timers in order with
    /// the clock set to each timer's due time.
    pub fn advance(&self, delta_ms: u64) -> usize {
        let target = self.clock.now_ms().saturating_add(delta_ms);
        let mut ran = 0;
        loop {
            let due = match self.next_due() {
                Some(due) if due <= target => due,
                _ => break,
            };
            self.clock.set(due);
            ran += self.poll();
        }
        self.clock.set(target);
        ran
    }

    /// Fire timers until the queue is empty or `max_steps` callbacks ran.
    pub fn run_until_idle(&self, max_steps: usize) -> usize {
        let mut ran = 0;
        while ran < max_steps {
            let Some(due) = self.next_due() else { break };
            self.clock.set(due);
            match self.pop_due(due) {
                Some(callback) => {
                    callback();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

impl TimerQueue<MonotonicClock> {
    /// Wall-clock scheduler with the given frame period.
    #[must_use]
    pub fn new_frame(frame_interval_ms: u64) -> Self {
        Self::with_clock(MonotonicClock::new(), frame_interval_ms)
    }
}

impl<C: Clock> TickScheduler for TimerQueue<C> {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn frame_interval_ms(&self) -> u64 {
        self.frame_interval_ms
    }

    fn schedule_after(&self, delay_ms: u64, callback: TickCallback) -> TimerId {
        let due_ms = self.clock.now_ms().saturating_add(delay_ms);
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.heap.push(DueTimer { due_ms, id });
        state.callbacks.insert(id, callback);
        id
    }
}

impl<C: Clock> std::fmt::Debug for TimerQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("now_ms", &self.clock.now_ms())
            .field("frame_interval_ms", &self.frame_interval_ms)
            .field("pending", &self.pending())
            .field("fired", &self.fired.get())
            .finish()
    }
}
