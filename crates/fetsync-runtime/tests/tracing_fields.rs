#![forbid(unsafe_code)]

//! Structured logging contract: span names and required fields emitted by
//! navigation, resolution and discarded writes.
//!
//! Run:
//!   cargo test -p fetsync-runtime --test tracing_fields

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::Harness;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

type Fields = HashMap<String, String>;

#[derive(Debug, Clone)]
struct CapturedSpan {
    name: &'static str,
    fields: Fields,
}

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: Level,
    message: String,
    fields: Fields,
    parent_span_name: Option<&'static str>,
}

#[derive(Default)]
struct Journal {
    spans: Vec<CapturedSpan>,
    by_id: HashMap<u64, usize>,
    events: Vec<CapturedEvent>,
}

/// Layer recording every span (with late `record` calls) and event.
#[derive(Default, Clone)]
struct Capture(Arc<Mutex<Journal>>);

#[derive(Default)]
struct Collect(Fields);

impl Visit for Collect {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{value:?}"));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_owned(), value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }
}

impl<S> tracing_subscriber::Layer<S> for Capture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut collect = Collect::default();
        attrs.record(&mut collect);
        let mut journal = self.0.lock().unwrap();
        let slot = journal.spans.len();
        journal.by_id.insert(id.into_u64(), slot);
        journal.spans.push(CapturedSpan {
            name: attrs.metadata().name(),
            fields: collect.0,
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut collect = Collect::default();
        values.record(&mut collect);
        let mut journal = self.0.lock().unwrap();
        if let Some(slot) = journal.by_id.get(&id.into_u64()).copied() {
            journal.spans[slot].fields.extend(collect.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collect = Collect::default();
        event.record(&mut collect);
        let parent_span_name = ctx.event_span(event).map(|span| span.name());
        self.0.lock().unwrap().events.push(CapturedEvent {
            level: *event.metadata().level(),
            message: collect.0.get("message").cloned().unwrap_or_default(),
            fields: collect.0,
            parent_span_name,
        });
    }
}

fn capture(run: impl FnOnce()) -> (Vec<CapturedSpan>, Vec<CapturedEvent>) {
    let layer = Capture::default();
    let journal = Arc::clone(&layer.0);
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::TRACE)
        .with(layer);
    tracing::subscriber::with_default(subscriber, run);
    let journal = journal.lock().unwrap();
    (journal.spans.clone(), journal.events.clone())
}

#[test]
fn resolve_span_records_state_and_duration() {
    let (spans, _) = capture(|| {
        let h = Harness::new(2);
        h.engine.start(0);
    });

    let resolve = spans
        .iter()
        .find(|s| s.name == "fetsync.resolve")
        .expect("resolve span");
    assert_eq!(resolve.fields.get("index").map(String::as_str), Some("0"));
    assert_eq!(
        resolve.fields.get("state").map(String::as_str),
        Some("QuestionOnly")
    );
    assert!(resolve.fields.contains_key("duration_us"));
}

#[test]
fn navigation_span_wraps_reset_events() {
    let (spans, events) = capture(|| {
        let h = Harness::new(2);
        h.engine.start(0);
        h.engine.navigate(1);
    });

    let nav = spans
        .iter()
        .find(|s| s.name == "fetsync.navigate")
        .expect("navigate span");
    assert_eq!(nav.fields.get("index").map(String::as_str), Some("1"));

    let reset = events
        .iter()
        .find(|e| e.message == "navigation reset")
        .expect("reset event");
    assert_eq!(reset.level, Level::DEBUG);
    assert_eq!(reset.parent_span_name, Some("fetsync.navigate"));
    assert_eq!(reset.fields.get("generation").map(String::as_str), Some("1"));
}

#[test]
fn stale_discard_is_logged_with_generations() {
    let (_, events) = capture(|| {
        let h = Harness::new(2);
        h.engine.start(0);
        let stale = h.engine.request_explanation();
        h.engine.navigate(1);
        let _ = h.producer.take(stale).complete(Some("E0".into()));
    });

    let discard = events
        .iter()
        .find(|e| e.message == "discarding stale explanation")
        .expect("discard event");
    assert_eq!(discard.fields.get("index").map(String::as_str), Some("0"));
    assert_eq!(discard.fields.get("token").map(String::as_str), Some("0"));
    assert_eq!(discard.fields.get("current").map(String::as_str), Some("1"));
}

#[test]
fn collaborator_panic_is_a_warning() {
    use fetsync_runtime::{
        BannerSource, Collaborators, DisplayEngine, EngineConfig, QuestionIndex, QuestionSource,
        VirtualScheduler,
    };
    use std::rc::Rc;

    struct Broken;
    impl QuestionSource for Broken {
        fn question_text(&self, _index: QuestionIndex) -> String {
            panic!("store offline")
        }
        fn is_multiple_answer(&self, _index: QuestionIndex) -> bool {
            false
        }
        fn option_count(&self, _index: QuestionIndex) -> usize {
            0
        }
    }
    impl BannerSource for Broken {
        fn correct_answer_banner(&self, _index: QuestionIndex) -> String {
            String::new()
        }
    }

    let (_, events) = capture(|| {
        let broken = Rc::new(Broken);
        let engine = DisplayEngine::new(
            EngineConfig::default(),
            Rc::new(VirtualScheduler::new_virtual(0, 16)),
            Collaborators {
                questions: broken.clone(),
                banners: broken,
                producer: Rc::new(common::ParkedProducer::default()),
            },
        );
        engine.start(0);
        assert_eq!(engine.display_text(), "Loading question...");
    });

    let warning = events
        .iter()
        .find(|e| e.level == Level::WARN)
        .expect("warning event");
    assert_eq!(
        warning.fields.get("collaborator").map(String::as_str),
        Some("question_text")
    );
    assert_eq!(warning.fields.get("panic").map(String::as_str), Some("store offline"));
}
