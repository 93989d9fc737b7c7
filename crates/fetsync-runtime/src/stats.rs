#![forbid(unsafe_code)]

//! Per-context counters.
//!
//! Plain `Cell<u64>` counters owned by the [`SyncContext`](crate::SyncContext);
//! the engine is single-threaded so no atomics are needed.

use std::cell::Cell;

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),+ $(,)?) => {
        /// Live counters.
        #[derive(Debug, Default)]
        pub struct SyncStats {
            $($name: Cell<u64>,)+
        }

        /// Point-in-time copy of [`SyncStats`].
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        #[cfg_attr(feature = "engine-config", derive(serde::Serialize))]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)+
        }

        impl SyncStats {
            $(
                pub(crate) fn $name(&self) {
                    self.$name.set(self.$name.get().saturating_add(1));
                }
            )+

            /// Copy the current counter values.
            #[must_use]
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.get(),)+
                }
            }
        }
    };
}

counters! {
    /// Navigations processed by the coordinator.
    navigations,
    /// Resolution cycles run by the engine.
    resolutions,
    /// Resolutions that changed the published display text.
    frames_emitted,
    /// Invalidations folded into an already pending tick.
    coalesced_invalidations,
    /// Explanation writes dropped for carrying a stale generation.
    stale_discards,
    /// Explanation writes dropped for targeting a non-active question.
    mismatch_discards,
    /// Explanation writes that carried blank text.
    empty_resolves,
    /// Explanation writes held behind the FET lock.
    deferred_resolves,
    /// Explanation writes that opened a gate.
    gates_opened,
    /// Scheduled unlocks discarded because a newer navigation happened.
    superseded_unlocks,
    /// Producers that reported no explanation data.
    missing_explanations,
    /// Panics caught inside the resolver or collaborator calls.
    caught_panics,
}
