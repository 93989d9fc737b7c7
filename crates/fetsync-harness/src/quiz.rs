#![forbid(unsafe_code)]

//! In-memory quiz backing the collaborator traits during replay.

use fetsync_runtime::{BannerSource, QuestionIndex, QuestionSource};

use crate::scenario::QuestionSpec;

/// Questions from a scenario. Indices past the end read as not yet loaded.
#[derive(Debug, Clone, Default)]
pub struct ScriptedQuiz {
    questions: Vec<QuestionSpec>,
}

impl ScriptedQuiz {
    #[must_use]
    pub fn new(questions: Vec<QuestionSpec>) -> Self {
        Self { questions }
    }

    #[must_use]
    pub fn question(&self, index: QuestionIndex) -> Option<&QuestionSpec> {
        self.questions.get(index)
    }

    /// Scripted explanation for `index`, if any.
    #[must_use]
    pub fn explanation(&self, index: QuestionIndex) -> Option<String> {
        self.question(index)
            .and_then(|question| question.explanation.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionSource for ScriptedQuiz {
    fn question_text(&self, index: QuestionIndex) -> String {
        self.question(index)
            .map(|question| question.text.clone())
            .unwrap_or_default()
    }

    fn is_multiple_answer(&self, index: QuestionIndex) -> bool {
        self.question(index)
            .is_some_and(QuestionSpec::is_multiple_answer)
    }

    fn option_count(&self, index: QuestionIndex) -> usize {
        self.question(index)
            .map_or(0, |question| question.option_count)
    }
}

impl BannerSource for ScriptedQuiz {
    fn correct_answer_banner(&self, index: QuestionIndex) -> String {
        match self.question(index) {
            Some(question) if question.is_multiple_answer() => {
                format!("({} answers are correct)", question.correct)
            }
            _ => String::new(),
        }
    }
}
