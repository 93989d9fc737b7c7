#![forbid(unsafe_code)]

//! Shared synchronization context.
//!
//! [`SyncContext`] owns the generation ledger, the explanation channel, the
//! quiet zone and the counters. It is created once per quiz session and
//! handed (as `Rc<SyncContext>`) to the coordinator and the engine. There is
//! no ambient global state: two sessions simply use two contexts.

use crate::channel::ExplanationChannel;
use crate::ledger::GenerationLedger;
use crate::quiet_zone::QuietZone;
use crate::stats::SyncStats;

/// Per-session owner of the engine's mutable state.
#[derive(Debug)]
pub struct SyncContext {
    ledger: GenerationLedger,
    channel: ExplanationChannel,
    quiet: QuietZone,
    stats: SyncStats,
}

impl SyncContext {
    #[must_use]
    pub fn new() -> Self {
        let ledger = GenerationLedger::new();
        let channel = ExplanationChannel::new(ledger.clone());
        Self {
            ledger,
            channel,
            quiet: QuietZone::new(),
            stats: SyncStats::default(),
        }
    }

    pub fn ledger(&self) -> &GenerationLedger {
        &self.ledger
    }

    pub fn channel(&self) -> &ExplanationChannel {
        &self.channel
    }

    pub fn quiet(&self) -> &QuietZone {
        &self.quiet
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}
