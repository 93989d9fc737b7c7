#![forbid(unsafe_code)]

//! Reset/purge coordinator.
//!
//! Runs the fixed reset sequence on every navigation:
//!
//! 1. bump the generation ledger,
//! 2. lock the explanation channel,
//! 3. purge records for every other question,
//! 4. re-arm the target as pending,
//! 5. schedule an unlock one settle delay later (`settle_ticks` ticks of
//!    `frame_interval_ms`), capturing the new generation,
//! 6. when the unlock fires, reopen the channel only if that generation is
//!    still current.
//!
//! A later navigation cancels an earlier unlock implicitly: the captured
//! token no longer matches, so the unlock is dropped. No cancel list exists.
//!
//! The coordinator also starts a new quiet-zone cycle and opens the settle
//! window, so the resolver holds question-only output while things settle.

use std::rc::{Rc, Weak};

use tracing::{debug, info_span};

use crate::channel::QuestionIndex;
use crate::config::EngineConfig;
use crate::context::SyncContext;
use crate::ledger::GenerationToken;
use crate::reactive::BatchScope;
use crate::scheduler::{TickScheduler, TimerId};

/// What a navigation reset did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationReset {
    pub index: QuestionIndex,
    pub generation: GenerationToken,
    /// Records removed for other questions.
    pub purged: usize,
    /// End of the quiet window opened for this navigation.
    pub quiet_until_ms: u64,
    /// Timer that will attempt the unlock.
    pub unlock_timer: TimerId,
}

/// Orchestrates ledger, channel and quiet zone on navigation.
pub struct ResetCoordinator {
    ctx: Rc<SyncContext>,
    scheduler: Rc<dyn TickScheduler>,
    settle_delay_ms: u64,
    quiet_window_ms: u64,
}

impl ResetCoordinator {
    /// A zero `settle_delay_ms` is clamped to 1 so the unlock never runs
    /// inside the navigation that scheduled it.
    pub fn new(
        ctx: Rc<SyncContext>,
        scheduler: Rc<dyn TickScheduler>,
        settle_delay_ms: u64,
        quiet_window_ms: u64,
    ) -> Self {
        Self {
            ctx,
            scheduler,
            settle_delay_ms: settle_delay_ms.max(1),
            quiet_window_ms,
        }
    }

    /// Timing taken from `config`.
    pub fn from_config(
        ctx: Rc<SyncContext>,
        scheduler: Rc<dyn TickScheduler>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(
            ctx,
            scheduler,
            config.settle_delay_ms(),
            config.quiet_window_ms,
        )
    }

    /// Arm the first question of a session under the initial generation.
    ///
    /// The first question is a load, not a navigation: no bump, no lock, no
    /// quiet window.
    pub fn begin_session(&self, index: QuestionIndex) -> GenerationToken {
        let channel = self.ctx.channel();
        {
            let _batch = BatchScope::new();
            channel.purge_except(index);
            channel.set_pending(index);
        }
        let generation = self.ctx.ledger().current();
        debug!(index, generation = generation.get(), "session started");
        generation
    }

    /// Run the reset sequence for a navigation to `index`.
    pub fn navigate(&self, index: QuestionIndex) -> NavigationReset {
        let now = self.scheduler.now_ms();
        let _span = info_span!("fetsync.navigate", index, now_ms = now).entered();

        let generation = self.ctx.ledger().bump();
        let purged = {
            let _batch = BatchScope::new();
            let channel = self.ctx.channel();
            channel.lock();
            let purged = channel.purge_except(index);
            channel.set_pending(index);
            purged
        };

        let quiet = self.ctx.quiet();
        quiet.begin_cycle();
        let quiet_until_ms = quiet.open(self.quiet_window_ms, now);

        let unlock_timer = self.schedule_unlock(generation);
        self.ctx.stats().navigations();

        debug!(
            index,
            generation = generation.get(),
            purged,
            quiet_until_ms,
            "navigation reset"
        );

        NavigationReset {
            index,
            generation,
            purged,
            quiet_until_ms,
            unlock_timer,
        }
    }

    /// Delay between a navigation and its unlock attempt.
    #[must_use]
    pub fn settle_delay_ms(&self) -> u64 {
        self.settle_delay_ms
    }

    fn schedule_unlock(&self, generation: GenerationToken) -> TimerId {
        let weak: Weak<SyncContext> = Rc::downgrade(&self.ctx);
        self.scheduler.schedule_after(
            self.settle_delay_ms(),
            Box::new(move || {
                let Some(ctx) = weak.upgrade() else {
                    return;
                };
                if ctx.channel().unlock_for(generation) {
                    debug!(generation = generation.get(), "channel unlocked");
                } else {
                    ctx.stats().superseded_unlocks();
                    debug!(
                        generation = generation.get(),
                        current = ctx.ledger().current().get(),
                        "unlock superseded by newer navigation"
                    );
                }
            }),
        )
    }
}

impl std::fmt::Debug for ResetCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetCoordinator")
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("quiet_window_ms", &self.quiet_window_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::VirtualScheduler;

    fn setup() -> (Rc<SyncContext>, Rc<VirtualScheduler>, ResetCoordinator) {
        let ctx = Rc::new(SyncContext::new());
        let sched = Rc::new(VirtualScheduler::new_virtual(0, 16));
        let coordinator = ResetCoordinator::new(Rc::clone(&ctx), sched.clone(), 32, 150);
        (ctx, sched, coordinator)
    }

    #[test]
    fn begin_session_does_not_bump() {
        let (ctx, _sched, coordinator) = setup();
        let token = coordinator.begin_session(0);
        assert_eq!(token, GenerationToken::INITIAL);
        assert_eq!(ctx.channel().active(), Some(0));
        assert!(!ctx.channel().is_locked());
    }

    #[test]
    fn navigate_runs_full_reset_sequence() {
        let (ctx, sched, coordinator) = setup();
        coordinator.begin_session(0);
        ctx.channel()
            .resolve(0, "E0", ctx.ledger().current())
            .unwrap();

        let reset = coordinator.navigate(1);
        assert_eq!(reset.generation, GenerationToken::new(1));
        assert_eq!(reset.purged, 1);
        assert_eq!(reset.quiet_until_ms, 150);
        assert!(ctx.channel().is_locked());
        assert!(ctx.channel().record(0).is_none());
        assert_eq!(ctx.channel().active(), Some(1));

        sched.advance(coordinator.settle_delay_ms());
        assert!(!ctx.channel().is_locked());
        assert_eq!(ctx.stats().snapshot().navigations, 1);
    }

    #[test]
    fn newer_navigation_supersedes_pending_unlock() {
        let (ctx, sched, coordinator) = setup();
        coordinator.begin_session(0);

        coordinator.navigate(1);
        sched.advance(10);
        coordinator.navigate(2);

        // First unlock fires at 32ms and must be discarded.
        sched.advance(22);
        assert!(ctx.channel().is_locked());
        assert_eq!(ctx.stats().snapshot().superseded_unlocks, 1);

        // Second unlock fires at 42ms.
        sched.advance(10);
        assert!(!ctx.channel().is_locked());
    }

    #[test]
    fn settle_delay_is_at_least_one_tick() {
        let ctx = Rc::new(SyncContext::new());
        let sched = Rc::new(VirtualScheduler::new_virtual(0, 16));
        let config = EngineConfig {
            settle_ticks: 0,
            ..EngineConfig::default()
        };
        let coordinator = ResetCoordinator::from_config(ctx, sched, &config);
        assert_eq!(coordinator.settle_delay_ms(), 16);
    }

    #[test]
    fn configured_frame_interval_sets_unlock_time() {
        let ctx = Rc::new(SyncContext::new());
        let sched = Rc::new(VirtualScheduler::new_virtual(0, 16));
        let config = EngineConfig {
            frame_interval_ms: 10,
            settle_ticks: 3,
            ..EngineConfig::default()
        };
        let coordinator = ResetCoordinator::from_config(Rc::clone(&ctx), sched.clone(), &config);
        assert_eq!(coordinator.settle_delay_ms(), 30);

        coordinator.navigate(1);
        sched.advance(29);
        assert!(ctx.channel().is_locked());
        sched.advance(1);
        assert!(!ctx.channel().is_locked());
    }

    #[test]
    fn dropped_context_makes_unlock_a_no_op() {
        let sched = Rc::new(VirtualScheduler::new_virtual(0, 16));
        {
            let ctx = Rc::new(SyncContext::new());
            let coordinator = ResetCoordinator::new(ctx, sched.clone(), 32, 150);
            coordinator.navigate(1);
        }
        assert_eq!(sched.advance(100), 1);
    }
}
