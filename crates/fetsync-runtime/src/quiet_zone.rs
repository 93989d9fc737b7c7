#![forbid(unsafe_code)]

//! Quiet-zone controller.
//!
//! After a navigation the display is held at question-only output for a
//! short settle window, even if a valid explanation has already arrived.
//! The window end only moves forward within one navigation cycle; a new
//! cycle (started by the coordinator) is the only way to shorten it.

use std::cell::Cell;

/// The currently open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "engine-config", derive(serde::Serialize))]
pub struct QuietWindow {
    pub until_ms: u64,
}

/// Time-windowed suppression flag.
#[derive(Debug, Default)]
pub struct QuietZone {
    until: Cell<Option<u64>>,
    cycle: Cell<u64>,
}

impl QuietZone {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or extend) the window to `now_ms + duration_ms`.
    ///
    /// Returns the effective end, which is never earlier than an end set
    /// previously in the same cycle.
    pub fn open(&self, duration_ms: u64, now_ms: u64) -> u64 {
        let candidate = now_ms.saturating_add(duration_ms);
        let until = match self.until.get() {
            Some(existing) => existing.max(candidate),
            None => candidate,
        };
        self.until.set(Some(until));
        tracing::trace!(until_ms = until, cycle = self.cycle.get(), "quiet window opened");
        until
    }

    /// Whether display updates are suppressed at `now_ms`.
    #[must_use]
    pub fn is_quiet(&self, now_ms: u64) -> bool {
        self.until.get().is_some_and(|until| now_ms < until)
    }

    /// End of the current window, if one was opened this cycle.
    #[must_use]
    pub fn until(&self) -> Option<u64> {
        self.until.get()
    }

    /// The current window, if one was opened this cycle.
    #[must_use]
    pub fn window(&self) -> Option<QuietWindow> {
        self.until.get().map(|until_ms| QuietWindow { until_ms })
    }

    /// Start a new navigation cycle, discarding the previous window.
    pub fn begin_cycle(&self) -> u64 {
        self.until.set(None);
        let next = self.cycle.get().saturating_add(1);
        self.cycle.set(next);
        next
    }

    /// Number of cycles started so far.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle.get()
    }
}
