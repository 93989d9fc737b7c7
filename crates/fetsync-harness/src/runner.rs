#![forbid(unsafe_code)]

//! Deterministic scenario replay.
//!
//! [`ScenarioRunner`] builds a [`DisplayEngine`] over a [`VirtualScheduler`],
//! replays the scenario's steps, records every published frame together with
//! the question that was active when it was published, and checks the
//! no-leakage invariant over the whole frame log.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use fetsync_runtime::resolver::with_banner;
use fetsync_runtime::{
    BannerSource, Clock, Collaborators, DisplayEngine, DisplayState,
    NavigationEvent, QuestionIndex, QuestionSource, StatsSnapshot, TickScheduler,
    VirtualScheduler,
};
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::error::{HarnessError, Result};
use crate::producer::DeferredProducer;
use crate::quiz::ScriptedQuiz;
use crate::scenario::{Scenario, Step};

/// One published display frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    pub seq: usize,
    pub at_ms: u64,
    /// Question active when the frame was published.
    pub index: QuestionIndex,
    pub text: String,
}

/// What happened to one released ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    pub step: usize,
    pub ticket: usize,
    pub index: QuestionIndex,
    pub generation: u64,
    pub at_ms: u64,
    pub outcome: String,
}

/// A frame whose text does not belong to its question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leak {
    pub frame: usize,
    pub index: QuestionIndex,
    pub text: String,
}

/// An `expect_text` step that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectationFailure {
    pub step: usize,
    pub expected: String,
    pub actual: String,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub frames: Vec<FrameRecord>,
    pub deliveries: Vec<DeliveryRecord>,
    pub leaks: Vec<Leak>,
    pub failures: Vec<ExpectationFailure>,
    pub final_text: String,
    pub final_state: DisplayState,
    pub stats: StatsSnapshot,
}

impl ScenarioReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.leaks.is_empty() && self.failures.is_empty()
    }

    /// One JSON object per frame and delivery, then a summary line.
    pub fn to_jsonl(&self) -> Result<String> {
        let mut out = String::new();
        for frame in &self.frames {
            let mut line = serde_json::to_value(frame)?;
            line["type"] = "frame".into();
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        for delivery in &self.deliveries {
            let mut line = serde_json::to_value(delivery)?;
            line["type"] = "delivery".into();
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        let summary = serde_json::json!({
            "type": "summary",
            "name": self.name,
            "passed": self.passed(),
            "final_text": self.final_text,
            "final_state": self.final_state,
            "leaks": self.leaks,
            "failures": self.failures,
            "stats": self.stats,
        });
        out.push_str(&serde_json::to_string(&summary)?);
        out.push('\n');
        Ok(out)
    }

    /// Human-readable frame table and verdict.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = format!("scenario: {}\n", self.name);
        for frame in &self.frames {
            out.push_str(&format!(
                "  #{:<3} {:>6}ms  q{:<3} {}\n",
                frame.seq, frame.at_ms, frame.index, frame.text
            ));
        }
        for leak in &self.leaks {
            out.push_str(&format!(
                "  LEAK frame #{} on q{}: {:?}\n",
                leak.frame, leak.index, leak.text
            ));
        }
        for failure in &self.failures {
            out.push_str(&format!(
                "  FAIL step {}: expected {:?}, got {:?}\n",
                failure.step, failure.expected, failure.actual
            ));
        }
        out.push_str(&format!(
            "  {} ({} frames, {} stale discards)\n",
            if self.passed() { "PASS" } else { "FAIL" },
            self.frames.len(),
            self.stats.stale_discards
        ));
        out
    }
}

/// Replays one [`Scenario`].
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    scenario: Scenario,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn run(&self) -> Result<ScenarioReport> {
        let scenario = &self.scenario;
        let _span = info_span!("fetsync.scenario", name = %scenario.name).entered();
        let config = scenario.config.clone();

        let sched = Rc::new(VirtualScheduler::new_virtual(0, config.frame_interval_ms));
        let quiz = Rc::new(ScriptedQuiz::new(scenario.questions.clone()));
        let producer = Rc::new(DeferredProducer::new());
        let engine = DisplayEngine::new(
            config.clone(),
            sched.clone(),
            Collaborators {
                questions: quiz.clone(),
                banners: quiz.clone(),
                producer: producer.clone(),
            },
        );

        let active = Rc::new(Cell::new(scenario.start_index));
        let frames: Rc<RefCell<Vec<FrameRecord>>> = Rc::new(RefCell::new(Vec::new()));
        let _watch = {
            let active = Rc::clone(&active);
            let frames = Rc::clone(&frames);
            let clock = sched.clock().clone();
            engine.display_stream().subscribe(move |text| {
                let mut frames = frames.borrow_mut();
                let seq = frames.len();
                frames.push(FrameRecord {
                    seq,
                    at_ms: clock.now_ms(),
                    index: active.get(),
                    text: text.to_owned(),
                });
            })
        };

        engine.start(scenario.start_index);

        let mut deliveries = Vec::new();
        let mut delivered: BTreeMap<QuestionIndex, Vec<String>> = BTreeMap::new();
        let mut failures = Vec::new();

        for (step_no, step) in scenario.steps.iter().enumerate() {
            let _step = info_span!("fetsync.step", step = step_no, op = step.op()).entered();
            match step {
                Step::Navigate { index } => {
                    active.set(*index);
                    engine.handle_navigation(NavigationEvent::start(*index, sched.now_ms()));
                }
                Step::CompleteNavigation { index } => {
                    engine.handle_navigation(NavigationEvent::complete(*index, sched.now_ms()));
                }
                Step::Answer => {
                    engine.mark_answered();
                    engine.set_should_show(true);
                }
                Step::SetShouldShow { show } => engine.set_should_show(*show),
                Step::SetMode { mode } => engine.set_mode(*mode),
                Step::RequestExplanation => {
                    engine.request_explanation();
                }
                Step::Deliver {
                    ticket,
                    text,
                    missing,
                } => {
                    let request = producer
                        .request(*ticket)
                        .ok_or(HarnessError::UnknownTicket {
                            step: step_no,
                            ticket: *ticket,
                        })?;
                    let payload = if *missing {
                        None
                    } else {
                        text.clone().or_else(|| quiz.explanation(request.index))
                    };
                    if let Some(payload) = &payload {
                        delivered
                            .entry(request.index)
                            .or_default()
                            .push(payload.clone());
                    }
                    let verdict = producer.release(step_no, *ticket, payload)?;
                    let outcome = match verdict {
                        Ok(outcome) => format!("{outcome:?}"),
                        Err(err) => err.kind().to_owned(),
                    };
                    debug!(ticket, index = request.index, %outcome, "ticket released");
                    deliveries.push(DeliveryRecord {
                        step: step_no,
                        ticket: *ticket,
                        index: request.index,
                        generation: request.generation.get(),
                        at_ms: sched.now_ms(),
                        outcome,
                    });
                }
                Step::Advance { ms } => {
                    sched.advance(*ms);
                }
                Step::ExpectText { text } => {
                    let actual = engine.display_text();
                    if &actual != text {
                        failures.push(ExpectationFailure {
                            step: step_no,
                            expected: text.clone(),
                            actual,
                        });
                    }
                }
            }
        }
        sched.advance(scenario.settle_ms);

        let frames = frames.borrow().clone();
        let leaks = find_leaks(&frames, &quiz, &delivered, &config);
        let report = ScenarioReport {
            name: scenario.name.clone(),
            frames,
            deliveries,
            leaks,
            failures,
            final_text: engine.display_text(),
            final_state: engine.display_state(),
            stats: engine.stats(),
        };
        info!(
            passed = report.passed(),
            frames = report.frames.len(),
            leaks = report.leaks.len(),
            "scenario replayed"
        );
        Ok(report)
    }
}

/// Frames whose text cannot belong to the question active at publish time.
fn find_leaks(
    frames: &[FrameRecord],
    quiz: &ScriptedQuiz,
    delivered: &BTreeMap<QuestionIndex, Vec<String>>,
    config: &fetsync_runtime::EngineConfig,
) -> Vec<Leak> {
    frames
        .iter()
        .filter(|frame| {
            let index = frame.index;
            let question = quiz.question_text(index);
            let shown_question = with_banner(
                question.trim(),
                &quiz.correct_answer_banner(index),
                quiz.is_multiple_answer(index),
            );
            let allowed = frame.text == shown_question
                || frame.text == config.loading_placeholder
                || frame.text == config.missing_explanation_text
                || delivered
                    .get(&index)
                    .is_some_and(|texts| texts.iter().any(|t| *t == frame.text));
            !allowed || frame.text.trim().is_empty()
        })
        .map(|frame| Leak {
            frame: frame.seq,
            index: frame.index,
            text: frame.text.clone(),
        })
        .collect()
}
