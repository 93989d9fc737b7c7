//! Benchmarks for the resolution hot path.
//!
//! Measures the pure combine step for each display state, and a full
//! navigate-deliver-settle cycle on virtual time.
//!
//! Run with: cargo bench -p fetsync-runtime --bench resolver_bench

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::rc::Rc;

use fetsync_runtime::{
    BannerSource, Collaborators, CombinedFrame, DisplayEngine, DisplayMode, DisplayModeState,
    DisplayResolver, EngineConfig, ExplanationProducer, ExplanationRequest, ExplanationSink,
    ExplanationView, GenerationToken, QuestionIndex, QuestionSource, VirtualScheduler,
};

// ============================================================================
// Setup helpers
// ============================================================================

fn frame(state: &str) -> CombinedFrame {
    let generation = GenerationToken::new(3);
    let mut frame = CombinedFrame {
        index: 4,
        question_text: "Which two of these are prime numbers?".into(),
        banner_text: "(2 answers are correct)".into(),
        multiple_answer: true,
        explanation: ExplanationView {
            index: Some(4),
            text: "Options 2 and 3 are correct because both are prime.".into(),
            gate_open: true,
            generation,
        },
        should_show: true,
        mode: DisplayModeState {
            mode: DisplayMode::Question,
            answered: true,
        },
        current_generation: generation,
        now_ms: 1_000,
        ..CombinedFrame::default()
    };
    match state {
        "quiet" => frame.quiet_until_ms = Some(1_100),
        "awaiting" => frame.explanation.gate_open = false,
        "stale" => frame.explanation.generation = GenerationToken::new(2),
        "empty" => frame.question_text.clear(),
        _ => {}
    }
    frame
}

struct StaticQuiz;

impl QuestionSource for StaticQuiz {
    fn question_text(&self, index: QuestionIndex) -> String {
        format!("Question {index}?")
    }
    fn is_multiple_answer(&self, index: QuestionIndex) -> bool {
        index % 3 == 0
    }
    fn option_count(&self, _index: QuestionIndex) -> usize {
        4
    }
}

impl BannerSource for StaticQuiz {
    fn correct_answer_banner(&self, _index: QuestionIndex) -> String {
        "(2 answers are correct)".into()
    }
}

struct Immediate;

impl ExplanationProducer for Immediate {
    fn request(&self, request: ExplanationRequest, sink: ExplanationSink) {
        let _ = sink.complete(Some(format!("Explanation {}", request.index)));
    }
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolver/combine");
    for state in ["visible", "quiet", "awaiting", "stale", "empty"] {
        let input = frame(state);
        group.bench_with_input(BenchmarkId::from_parameter(state), &input, |b, input| {
            let mut resolver = DisplayResolver::default();
            b.iter(|| black_box(resolver.resolve(black_box(input))));
        });
    }
    group.finish();
}

fn bench_navigation_cycle(c: &mut Criterion) {
    c.bench_function("engine/navigate_deliver_settle", |b| {
        let sched = Rc::new(VirtualScheduler::new_virtual(0, 16));
        let quiz = Rc::new(StaticQuiz);
        let engine = DisplayEngine::new(
            EngineConfig::default(),
            sched.clone(),
            Collaborators {
                questions: quiz.clone(),
                banners: quiz,
                producer: Rc::new(Immediate),
            },
        );
        engine.start(0);
        let mut index = 0;
        b.iter(|| {
            index = (index + 1) % 50;
            engine.navigate(index);
            engine.mark_answered();
            engine.set_should_show(true);
            engine.request_explanation();
            sched.advance(200);
            black_box(engine.display_text())
        });
    });
}

criterion_group!(benches, bench_combine, bench_navigation_cycle);
criterion_main!(benches);
