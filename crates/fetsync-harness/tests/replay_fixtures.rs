//! Replays every scenario under `tests/fixtures/` and checks the frame logs.

use std::path::PathBuf;

use fetsync_harness::{Scenario, ScenarioReport, ScenarioRunner};
use fetsync_runtime::DisplayState;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn replay(name: &str) -> ScenarioReport {
    let scenario = Scenario::from_file(fixture(name)).unwrap();
    ScenarioRunner::new(scenario).run().unwrap()
}

fn texts(report: &ScenarioReport) -> Vec<&str> {
    report.frames.iter().map(|f| f.text.as_str()).collect()
}

#[test]
fn explanation_visible_fixture_passes() {
    let report = replay("explanation_visible.json");
    assert!(report.passed(), "{}", report.render_text());
    assert_eq!(
        texts(&report),
        vec!["Q0 text?", "E0 because", "Q1 text?"],
        "{}",
        report.render_text()
    );
    assert_eq!(report.final_state, DisplayState::QuestionOnly);
    assert_eq!(report.deliveries[0].outcome, "Opened");
}

#[test]
fn late_result_fixture_discards_stale_completion() {
    let report = replay("late_result_after_navigation.json");
    assert!(report.passed(), "{}", report.render_text());
    assert!(texts(&report).iter().all(|t| *t != "E0"));
    assert_eq!(report.deliveries[0].outcome, "stale_generation");
    assert_eq!(report.deliveries[0].generation, 0);
    assert_eq!(report.stats.stale_discards, 1);
}

#[test]
fn banner_fixture_decorates_only_the_question() {
    let report = replay("multi_answer_banner.json");
    assert!(report.passed(), "{}", report.render_text());
    assert!(
        texts(&report)
            .iter()
            .all(|t| !t.starts_with("Both B and C (")),
        "banner must never follow an explanation"
    );
    assert!(
        texts(&report)
            .iter()
            .all(|t| t.matches("answers are correct").count() <= 1)
    );
}

#[test]
fn deferred_fixture_opens_after_unlock() {
    let report = replay("deferred_behind_lock.json");
    assert!(report.passed(), "{}", report.render_text());
    assert_eq!(report.deliveries[0].outcome, "Deferred");
    assert_eq!(report.stats.deferred_resolves, 1);
    assert_eq!(report.final_text, "E1");
    assert_eq!(report.final_state, DisplayState::ExplanationVisible);
}

#[test]
fn fallback_fixture_never_goes_blank() {
    let report = replay("missing_and_loading.json");
    assert!(report.passed(), "{}", report.render_text());
    assert_eq!(report.stats.missing_explanations, 1);
    assert_eq!(report.final_text, "Loading question...");
    assert!(report.frames.iter().all(|f| !f.text.trim().is_empty()));
}

#[test]
fn failing_fixture_reports_the_step() {
    let report = replay("failing_expectation.json");
    assert!(!report.passed());
    assert!(report.leaks.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, 5);
    assert_eq!(report.failures[0].actual, "Custom E0");
}

#[test]
fn every_fixture_parses() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let mut count = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "json") {
            Scenario::from_file(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
            count += 1;
        }
    }
    assert_eq!(count, 6);
}
