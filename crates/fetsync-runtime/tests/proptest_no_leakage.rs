//! Property-based invariants for the display engine under arbitrary
//! interleavings of navigation, answering, explanation delivery and time.
//!
//! ## Invariants
//!
//! 1. No leakage: a published frame only ever carries text belonging to the
//!    question that was active when it was published.
//! 2. Never blank: no published frame is empty or whitespace.
//! 3. Stale drop: a completion issued under a superseded generation is
//!    always rejected.
//! 4. At most one resolution per render tick.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::Harness;
use fetsync_runtime::{DisplayMode, DisplayModeState, NavigationEvent, SyncError, TickScheduler};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Navigate(usize),
    StartNavigation(usize),
    CompleteNavigation,
    Answer,
    ExplanationMode,
    Request,
    Deliver { slot: usize, missing: bool },
    Advance(u64),
}

// ── Strategies ────────────────────────────────────────────────────────────

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..5).prop_map(Op::Navigate),
        (0usize..5).prop_map(Op::StartNavigation),
        Just(Op::CompleteNavigation),
        Just(Op::Answer),
        Just(Op::ExplanationMode),
        Just(Op::Request),
        (0usize..8, prop::bool::weighted(0.1))
            .prop_map(|(slot, missing)| Op::Deliver { slot, missing }),
        (0u64..250).prop_map(Op::Advance),
    ]
}

fn allowed_texts(index: usize) -> [String; 4] {
    [
        format!("Q{index} text?"),
        format!("E{index}"),
        "Loading question...".to_owned(),
        "No explanation available".to_owned(),
    ]
}

fn run(ops: &[Op]) -> Result<(), TestCaseError> {
    let h = Harness::new(4);
    let active = Rc::new(Cell::new(0_usize));
    let violations = Rc::new(Cell::new(0_u32));

    let watch_active = Rc::clone(&active);
    let watch_violations = Rc::clone(&violations);
    let _watch = h.engine.display_stream().subscribe(move |text| {
        let index = watch_active.get();
        if text.trim().is_empty() || !allowed_texts(index).iter().any(|t| t == text) {
            watch_violations.set(watch_violations.get() + 1);
        }
    });

    h.engine.start(0);
    let mut target = 0;
    for op in ops {
        match *op {
            Op::Navigate(i) => {
                active.set(i);
                target = i;
                h.engine.navigate(i);
            }
            Op::StartNavigation(i) => {
                active.set(i);
                target = i;
                h.engine
                    .handle_navigation(NavigationEvent::start(i, h.sched.now_ms()));
            }
            Op::CompleteNavigation => {
                h.engine
                    .handle_navigation(NavigationEvent::complete(target, h.sched.now_ms()));
            }
            Op::Answer => h.answer(),
            Op::ExplanationMode => h.engine.set_display_mode(DisplayModeState {
                mode: DisplayMode::Explanation,
                answered: true,
            }),
            Op::Request => {
                h.engine.request_explanation();
            }
            Op::Deliver { slot, missing } => {
                let sink = {
                    let mut parked = h.producer.parked.borrow_mut();
                    if parked.is_empty() {
                        continue;
                    }
                    let pos = slot % parked.len();
                    parked.remove(pos)
                };
                let request = sink.request();
                let current = h.engine.context().ledger().current();
                let text = (!missing).then(|| format!("E{}", request.index));
                let result = sink.complete(text);
                if request.generation != current {
                    let is_stale = matches!(result, Err(SyncError::StaleGeneration { .. }));
                    prop_assert!(is_stale);
                }
            }
            Op::Advance(ms) => {
                let before = h.engine.stats().resolutions;
                let fired = h.sched.advance(ms);
                let ticks = ms / 16 + 1;
                prop_assert!(h.engine.stats().resolutions - before <= ticks.min(fired as u64));
            }
        }
        prop_assert_eq!(violations.get(), 0, "leaked frame after {:?}", op);
    }

    h.sched.advance(1_000);
    prop_assert_eq!(violations.get(), 0);
    let final_text = h.engine.display_text();
    prop_assert!(allowed_texts(active.get()).contains(&final_text));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn frames_never_leak_across_questions(ops in prop::collection::vec(arb_op(), 1..60)) {
        run(&ops)?;
    }
}
