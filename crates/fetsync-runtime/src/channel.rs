#![forbid(unsafe_code)]

//! Explanation channel: the per-question arena of explanation records.
//!
//! # Design
//!
//! One arena keyed by [`QuestionIndex`] replaces ad hoc per-feature maps.
//! Records are created by [`ExplanationChannel::set_pending`], written only by
//! [`ExplanationChannel::resolve`] and the unlock path, and removed by
//! [`ExplanationChannel::purge`]. Nothing else can touch them.
//!
//! Every write checks the [`GenerationLedger`] and the active index before
//! mutating. Execution is single-threaded, so the check-then-write is
//! race-free without locks.
//!
//! The channel also carries the global FET lock. While locked, a valid write
//! is stored with its gate closed ([`ResolveOutcome::Deferred`]); the gate
//! opens when the coordinator's unlock for the same generation fires.
//!
//! # Invariants
//!
//! 1. A gate only opens when the record's generation is current and its
//!    index is active.
//! 2. Blank text never opens a gate.
//! 3. Re-resolving with identical arguments leaves the revision untouched.
//! 4. `revision` increments exactly once per observable state change.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::debug;

use crate::error::SyncError;
use crate::ledger::{GenerationLedger, GenerationToken};
use crate::reactive::{Observable, Subscription};

/// Logical position of a question in the quiz.
pub type QuestionIndex = usize;

/// Explanation state for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "engine-config", derive(serde::Serialize))]
pub struct ExplanationRecord {
    pub index: QuestionIndex,
    pub text: String,
    pub gate_open: bool,
    pub generation: GenerationToken,
}

impl ExplanationRecord {
    fn pending(index: QuestionIndex, generation: GenerationToken) -> Self {
        Self {
            index,
            text: String::new(),
            gate_open: false,
            generation,
        }
    }
}

/// Result of an accepted [`ExplanationChannel::resolve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Text stored and gate opened.
    Opened,
    /// Text stored behind the FET lock; the gate opens on unlock.
    Deferred,
    /// Blank text: treated as no content, gate left closed.
    NoContent,
    /// Identical to the stored state; nothing changed.
    Unchanged,
}

#[derive(Debug, Default)]
struct ChannelState {
    records: BTreeMap<QuestionIndex, ExplanationRecord>,
    active: Option<QuestionIndex>,
    locked: bool,
}

/// Arena of [`ExplanationRecord`]s plus the FET lock.
pub struct ExplanationChannel {
    ledger: GenerationLedger,
    state: RefCell<ChannelState>,
    revision: Observable<u64>,
}

impl ExplanationChannel {
    /// Create an empty, unlocked channel bound to `ledger`.
    #[must_use]
    pub fn new(ledger: GenerationLedger) -> Self {
        Self {
            ledger,
            state: RefCell::new(ChannelState::default()),
            revision: Observable::new(0),
        }
    }

    /// Mark `index` as active and awaiting its explanation.
    ///
    /// Any previous record for `index` is replaced by an empty, closed one
    /// tagged with the current generation.
    pub fn set_pending(&self, index: QuestionIndex) {
        let generation = self.ledger.current();
        {
            let mut state = self.state.borrow_mut();
            state.active = Some(index);
            state
                .records
                .insert(index, ExplanationRecord::pending(index, generation));
        }
        debug!(index, generation = generation.get(), "explanation pending");
        self.touch();
    }

    /// Write explanation text for `index` under `token`.
    ///
    /// The write is accepted only if `token` is current and `index` is the
    /// active question; otherwise it is logged and discarded for good.
    pub fn resolve(
        &self,
        index: QuestionIndex,
        text: &str,
        token: GenerationToken,
    ) -> Result<ResolveOutcome, SyncError> {
        let current = self.ledger.current();
        if token != current {
            debug!(
                index,
                token = token.get(),
                current = current.get(),
                "discarding stale explanation"
            );
            return Err(SyncError::StaleGeneration {
                index,
                token,
                current,
            });
        }

        let outcome = {
            let mut state = self.state.borrow_mut();
            if state.active != Some(index) {
                debug!(index, active = ?state.active, "discarding explanation for inactive question");
                return Err(SyncError::IndexMismatch {
                    index,
                    active: state.active,
                });
            }

            if text.trim().is_empty() {
                debug!(index, "explanation text is blank; gate stays closed");
                return Ok(ResolveOutcome::NoContent);
            }

            let locked = state.locked;
            let record = state
                .records
                .entry(index)
                .or_insert_with(|| ExplanationRecord::pending(index, token));

            let gate_open = !locked;
            if record.text == text && record.generation == token && record.gate_open == gate_open
            {
                return Ok(ResolveOutcome::Unchanged);
            }

            record.text = text.to_owned();
            record.generation = token;
            record.gate_open = gate_open;
            if locked {
                ResolveOutcome::Deferred
            } else {
                ResolveOutcome::Opened
            }
        };

        debug!(index, generation = token.get(), outcome = ?outcome, "explanation resolved");
        self.touch();
        Ok(outcome)
    }

    /// Whether the gate for `index` is open.
    #[must_use]
    pub fn gate(&self, index: QuestionIndex) -> bool {
        self.state
            .borrow()
            .records
            .get(&index)
            .is_some_and(|r| r.gate_open)
    }

    /// Stored explanation text for `index` (empty when absent).
    #[must_use]
    pub fn text(&self, index: QuestionIndex) -> String {
        self.state
            .borrow()
            .records
            .get(&index)
            .map(|r| r.text.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the record for `index`.
    #[must_use]
    pub fn record(&self, index: QuestionIndex) -> Option<ExplanationRecord> {
        self.state.borrow().records.get(&index).cloned()
    }

    /// Remove the record for `index`, clearing its text and closing its gate.
    ///
    /// Returns `true` if a record existed.
    pub fn purge(&self, index: QuestionIndex) -> bool {
        let removed = self.state.borrow_mut().records.remove(&index).is_some();
        if removed {
            debug!(index, "explanation purged");
            self.touch();
        }
        removed
    }

    /// Purge every record whose index differs from `keep`. Returns the
    /// number of records removed.
    pub fn purge_except(&self, keep: QuestionIndex) -> usize {
        let removed = {
            let mut state = self.state.borrow_mut();
            let before = state.records.len();
            state.records.retain(|&index, _| index == keep);
            before - state.records.len()
        };
        if removed > 0 {
            debug!(keep, removed, "stale explanations purged");
            self.touch();
        }
        removed
    }

    /// Close the channel to gate-opening writes until the next unlock.
    pub fn lock(&self) {
        let changed = {
            let mut state = self.state.borrow_mut();
            let was = state.locked;
            state.locked = true;
            for record in state.records.values_mut() {
                record.gate_open = false;
            }
            !was
        };
        if changed {
            self.touch();
        }
    }

    /// Reopen the channel if `token` is still current.
    ///
    /// A deferred record for the active question whose generation matches
    /// `token` gets its gate opened. Returns `false` (and changes nothing)
    /// when `token` has been superseded.
    pub fn unlock_for(&self, token: GenerationToken) -> bool {
        if !self.ledger.is_current(token) {
            return false;
        }
        {
            let mut state = self.state.borrow_mut();
            state.locked = false;
            if let Some(active) = state.active
                && let Some(record) = state.records.get_mut(&active)
                && record.generation == token
                && !record.text.trim().is_empty()
            {
                record.gate_open = true;
                debug!(index = active, generation = token.get(), "deferred explanation released");
            }
        }
        self.touch();
        true
    }

    /// Whether the FET lock is engaged.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    /// The question index writes are currently accepted for.
    #[must_use]
    pub fn active(&self) -> Option<QuestionIndex> {
        self.state.borrow().active
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().records.len()
    }

    /// Whether the arena holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotonic change counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// Register a callback invoked after every state change.
    pub fn subscribe(&self, callback: impl Fn(&u64) + 'static) -> Subscription {
        self.revision.subscribe(callback)
    }

    fn touch(&self) {
        self.revision.update(|rev| *rev += 1);
    }
}

impl std::fmt::Debug for ExplanationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ExplanationChannel")
            .field("active", &state.active)
            .field("locked", &state.locked)
            .field("records", &state.records.len())
            .field("revision", &self.revision.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
