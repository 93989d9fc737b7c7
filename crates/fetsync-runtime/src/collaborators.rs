#![forbid(unsafe_code)]

//! Seams to the systems the engine does not own.
//!
//! Question data, the correct-answer banner and explanation formatting all
//! live elsewhere. The engine reads them through these traits on demand and
//! receives explanation text back through a tagged [`ExplanationSink`].

use std::rc::Weak;

use crate::channel::{QuestionIndex, ResolveOutcome};
use crate::error::SyncError;
use crate::ledger::GenerationToken;

/// Which phase of a navigation an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "engine-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum NavigationPhase {
    Start,
    Complete,
}

/// Event emitted by the navigation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "engine-config", derive(serde::Serialize, serde::Deserialize))]
pub struct NavigationEvent {
    pub target_index: QuestionIndex,
    pub timestamp_ms: u64,
    pub phase: NavigationPhase,
}

impl NavigationEvent {
    #[must_use]
    pub const fn start(target_index: QuestionIndex, timestamp_ms: u64) -> Self {
        Self {
            target_index,
            timestamp_ms,
            phase: NavigationPhase::Start,
        }
    }

    #[must_use]
    pub const fn complete(target_index: QuestionIndex, timestamp_ms: u64) -> Self {
        Self {
            target_index,
            timestamp_ms,
            phase: NavigationPhase::Complete,
        }
    }
}

/// Question/explanation display mode from the display-mode store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "engine-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum DisplayMode {
    #[default]
    Question,
    Explanation,
}

/// Display mode plus whether the active question has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "engine-config", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayModeState {
    pub mode: DisplayMode,
    pub answered: bool,
}

impl DisplayModeState {
    /// Whether explanation content may be shown at all.
    ///
    /// Explanation mode always qualifies; question mode qualifies only once
    /// the question is answered and the caller asked to show it.
    #[must_use]
    pub fn explanation_eligible(self, should_show: bool) -> bool {
        self.mode == DisplayMode::Explanation || (self.answered && should_show)
    }
}

/// Source of question data.
pub trait QuestionSource {
    /// Question prompt; empty while not yet loaded.
    fn question_text(&self, index: QuestionIndex) -> String;

    /// Whether more than one option is correct.
    fn is_multiple_answer(&self, index: QuestionIndex) -> bool;

    /// Number of options currently available.
    fn option_count(&self, index: QuestionIndex) -> usize;
}

/// Source of the correct-answer banner, e.g. "(2 answers are correct)".
pub trait BannerSource {
    fn correct_answer_banner(&self, index: QuestionIndex) -> String;
}

/// Request handed to the explanation producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplanationRequest {
    pub index: QuestionIndex,
    pub generation: GenerationToken,
}

/// Asynchronous explanation formatter.
///
/// Implementations may complete the sink immediately or on any later tick.
/// They are never cancelled: a late completion is simply discarded.
pub trait ExplanationProducer {
    fn request(&self, request: ExplanationRequest, sink: ExplanationSink);
}

/// Receiving side of a completed explanation.
pub(crate) trait ExplanationReceiver {
    fn receive(
        &self,
        request: ExplanationRequest,
        text: Option<String>,
    ) -> Result<ResolveOutcome, SyncError>;
}

/// Tagged, one-shot completion handle for an [`ExplanationRequest`].
///
/// The sink remembers the index and generation it was issued under; the
/// engine checks both before anything is written.
pub struct ExplanationSink {
    request: ExplanationRequest,
    receiver: Weak<dyn ExplanationReceiver>,
}

impl ExplanationSink {
    pub(crate) fn new(request: ExplanationRequest, receiver: Weak<dyn ExplanationReceiver>) -> Self {
        Self { request, receiver }
    }

    /// The request this sink answers.
    #[must_use]
    pub fn request(&self) -> ExplanationRequest {
        self.request
    }

    /// Deliver formatted explanation text (`None` when no explanation data
    /// exists for the question).
    ///
    /// The returned value reports what happened; callers may ignore it since
    /// every error is already logged and counted.
    pub fn complete(self, text: Option<String>) -> Result<ResolveOutcome, SyncError> {
        match self.receiver.upgrade() {
            Some(receiver) => receiver.receive(self.request, text),
            None => Err(SyncError::EngineDropped {
                index: self.request.index,
            }),
        }
    }
}

impl std::fmt::Debug for ExplanationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplanationSink")
            .field("request", &self.request)
            .field("engine_alive", &(self.receiver.strong_count() > 0))
            .finish()
    }
}
