#![allow(dead_code)]

//! Shared fixtures for the integration tests: an in-memory quiz and a
//! producer that holds completions until the test releases them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use fetsync_runtime::{
    BannerSource, Collaborators, DisplayEngine, EngineConfig, ExplanationProducer,
    ExplanationRequest, ExplanationSink, QuestionIndex, QuestionSource, VirtualScheduler,
};

pub const BANNER: &str = "(2 answers are correct)";

#[derive(Default)]
pub struct MemoryQuiz {
    pub questions: RefCell<HashMap<QuestionIndex, String>>,
    pub multi: RefCell<Vec<QuestionIndex>>,
}

impl MemoryQuiz {
    pub fn with_questions(count: usize) -> Self {
        let quiz = Self::default();
        for i in 0..count {
            quiz.questions.borrow_mut().insert(i, format!("Q{i} text?"));
        }
        quiz
    }
}

impl QuestionSource for MemoryQuiz {
    fn question_text(&self, index: QuestionIndex) -> String {
        self.questions.borrow().get(&index).cloned().unwrap_or_default()
    }

    fn is_multiple_answer(&self, index: QuestionIndex) -> bool {
        self.multi.borrow().contains(&index)
    }

    fn option_count(&self, index: QuestionIndex) -> usize {
        usize::from(self.questions.borrow().contains_key(&index)) * 4
    }
}

impl BannerSource for MemoryQuiz {
    fn correct_answer_banner(&self, _index: QuestionIndex) -> String {
        BANNER.to_owned()
    }
}

/// Producer that parks every sink until the test completes it.
#[derive(Default)]
pub struct ParkedProducer {
    pub parked: RefCell<Vec<ExplanationSink>>,
}

impl ExplanationProducer for ParkedProducer {
    fn request(&self, _request: ExplanationRequest, sink: ExplanationSink) {
        self.parked.borrow_mut().push(sink);
    }
}

impl ParkedProducer {
    pub fn take(&self, request: ExplanationRequest) -> ExplanationSink {
        let mut parked = self.parked.borrow_mut();
        let pos = parked
            .iter()
            .position(|sink| sink.request() == request)
            .expect("request was parked");
        parked.remove(pos)
    }
}

pub struct Harness {
    pub sched: Rc<VirtualScheduler>,
    pub quiz: Rc<MemoryQuiz>,
    pub producer: Rc<ParkedProducer>,
    pub engine: DisplayEngine,
    pub frames: Rc<RefCell<Vec<(u64, String)>>>,
    _watch: fetsync_runtime::Subscription,
}

impl Harness {
    pub fn new(question_count: usize) -> Self {
        let sched = Rc::new(VirtualScheduler::new_virtual(0, 16));
        let quiz = Rc::new(MemoryQuiz::with_questions(question_count));
        let producer = Rc::new(ParkedProducer::default());
        let engine = DisplayEngine::new(
            EngineConfig::default(),
            sched.clone(),
            Collaborators {
                questions: quiz.clone(),
                banners: quiz.clone(),
                producer: producer.clone(),
            },
        );

        let frames = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&frames);
        let clock = sched.clock().clone();
        let watch = engine.display_stream().subscribe(move |text| {
            use fetsync_runtime::Clock;
            log.borrow_mut().push((clock.now_ms(), text.to_owned()));
        });

        Self {
            sched,
            quiz,
            producer,
            engine,
            frames,
            _watch: watch,
        }
    }

    pub fn answer(&self) {
        self.engine.mark_answered();
        self.engine.set_should_show(true);
    }

    pub fn texts(&self) -> Vec<String> {
        self.frames.borrow().iter().map(|(_, t)| t.clone()).collect()
    }
}
