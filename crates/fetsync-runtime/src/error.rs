#![forbid(unsafe_code)]

//! Error taxonomy for the synchronization engine.
//!
//! None of these errors ever reach the rendering layer. Each one is absorbed
//! at the boundary that detects it, logged, counted in
//! [`SyncStats`](crate::stats::SyncStats), and mapped to a display fallback
//! via [`SyncError::fallback`].

use thiserror::Error;

use crate::channel::QuestionIndex;
use crate::ledger::GenerationToken;

/// Engine-level error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A result arrived tagged with a superseded generation.
    #[error("stale explanation for question {index}: {token} is older than {current}")]
    StaleGeneration {
        index: QuestionIndex,
        token: GenerationToken,
        current: GenerationToken,
    },

    /// An explanation targeted a question other than the active one.
    #[error("explanation targets question {index} but question {active:?} is active")]
    IndexMismatch {
        index: QuestionIndex,
        active: Option<QuestionIndex>,
    },

    /// The producer found no explanation data for a question.
    #[error("no explanation available for question {index}")]
    MissingExplanation { index: QuestionIndex },

    /// A valid explanation arrived while the FET lock was engaged; it is held
    /// until the unlock for its generation fires.
    #[error("explanation for question {index} deferred behind the FET lock")]
    ChannelLocked { index: QuestionIndex },

    /// The question text source produced blank text.
    #[error("question {index} has no text yet")]
    EmptyUpstream { index: QuestionIndex },

    /// A completion arrived after its engine was dropped.
    #[error("explanation for question {index} arrived after the engine was dropped")]
    EngineDropped { index: QuestionIndex },

    /// The resolver panicked while combining inputs.
    #[error("display resolver panicked: {message}")]
    ResolverPanicked { message: String },
}

/// What the display should do when an error is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Drop the input; the display is unaffected.
    Discard,
    /// Show the question text for the active index.
    ShowQuestion,
    /// Resolve with the configured "no explanation" literal.
    MissingLiteral,
    /// Keep the last known-good text (or the loading placeholder).
    HoldLastGood,
}

impl SyncError {
    /// Map the error to its display fallback.
    #[must_use]
    pub fn fallback(&self) -> Fallback {
        match self {
            Self::StaleGeneration { .. } | Self::EngineDropped { .. } => Fallback::Discard,
            Self::IndexMismatch { .. } | Self::ChannelLocked { .. } => Fallback::ShowQuestion,
            Self::MissingExplanation { .. } => Fallback::MissingLiteral,
            Self::EmptyUpstream { .. } | Self::ResolverPanicked { .. } => Fallback::HoldLastGood,
        }
    }

    /// Short label for logs and counters.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StaleGeneration { .. } => "stale_generation",
            Self::IndexMismatch { .. } => "index_mismatch",
            Self::ChannelLocked { .. } => "channel_locked",
            Self::MissingExplanation { .. } => "missing_explanation",
            Self::EmptyUpstream { .. } => "empty_upstream",
            Self::EngineDropped { .. } => "engine_dropped",
            Self::ResolverPanicked { .. } => "resolver_panicked",
        }
    }
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
