#![forbid(unsafe_code)]

//! Display resolver: decides the one string to render.
//!
//! # State machine
//!
//! ```text
//!                 navigating | quiet | index/generation mismatch
//!            +-----------------------------------------------+
//!            v                                               |
//!     QuestionOnly --eligible, gate closed or locked--> AwaitingExplanation
//!            ^                                               |
//!            |                        gate open, not locked  v
//!            +---------- any suppression ----------- ExplanationVisible
//! ```
//!
//! Precedence, checked in order:
//!
//! 1. blank question text: hold last good text or the loading placeholder,
//! 2. suppression: navigating or quiet,
//! 3. index and generation match between the explanation and the frame,
//! 4. explanation eligibility,
//! 5. the FET lock, the gate and blank explanation text,
//! 6. explanation visible.
//!
//! # Failure semantics
//!
//! [`DisplayResolver::resolve`] never returns an empty string. Errors from
//! the combine step are mapped through [`SyncError::fallback`]: blank
//! question text and panics hold the last known-good text *for the same
//! question*, then the loading placeholder. A last-good value from another
//! question is never reused, so fallback cannot leak text across questions.
//!
//! Panics are only caught in unwinding builds. Under `panic = "abort"` a
//! panic in the combine step ends the process instead.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};

use crate::channel::QuestionIndex;
use crate::collaborators::DisplayModeState;
use crate::config::{DEFAULT_LOADING_PLACEHOLDER, DEFAULT_MISSING_EXPLANATION, EngineConfig};
use crate::error::{Fallback, SyncError, panic_message};
use crate::ledger::GenerationToken;

/// Logical resolver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "engine-config",
    derive(serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum DisplayState {
    QuestionOnly,
    AwaitingExplanation,
    ExplanationVisible,
}

/// Explanation channel contents as seen by one resolution cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExplanationView {
    /// Index the explanation belongs to (`None` when no record exists).
    pub index: Option<QuestionIndex>,
    pub text: String,
    pub gate_open: bool,
    pub generation: GenerationToken,
}

/// Every input of one resolution cycle. Built fresh each cycle, consumed
/// once, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CombinedFrame {
    pub index: QuestionIndex,
    pub question_text: String,
    pub banner_text: String,
    pub multiple_answer: bool,
    pub explanation: ExplanationView,
    pub should_show: bool,
    pub mode: DisplayModeState,
    pub navigating: bool,
    pub locked: bool,
    pub current_generation: GenerationToken,
    pub quiet_until_ms: Option<u64>,
    pub now_ms: u64,
}

impl CombinedFrame {
    /// Whether the quiet window covers `now_ms`.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.quiet_until_ms.is_some_and(|until| self.now_ms < until)
    }
}

/// Output of one resolution cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Non-empty text to render.
    pub text: String,
    pub state: DisplayState,
    /// The question the text belongs to; always the frame's index.
    pub origin_index: QuestionIndex,
    /// Error absorbed while resolving, if any.
    pub absorbed: Option<SyncError>,
}

/// Fixed strings the display may fall back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub loading: String,
    pub missing: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            loading: DEFAULT_LOADING_PLACEHOLDER.to_owned(),
            missing: DEFAULT_MISSING_EXPLANATION.to_owned(),
        }
    }
}

impl Placeholders {
    /// Literals from `config`; a blank literal is replaced by its default.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let pick = |configured: &str, default: &str| {
            if configured.trim().is_empty() {
                warn!(default, "blank fallback literal in config; using default");
                default.to_owned()
            } else {
                configured.to_owned()
            }
        };
        Self {
            loading: pick(&config.loading_placeholder, DEFAULT_LOADING_PLACEHOLDER),
            missing: pick(
                &config.missing_explanation_text,
                DEFAULT_MISSING_EXPLANATION,
            ),
        }
    }

    /// Fixed literal behind `fallback`, if it uses one.
    ///
    /// `HoldLastGood` maps to the loading placeholder, used when no last
    /// good text exists for the question.
    #[must_use]
    pub fn literal(&self, fallback: Fallback) -> Option<&str> {
        match fallback {
            Fallback::MissingLiteral => Some(&self.missing),
            Fallback::HoldLastGood => Some(&self.loading),
            Fallback::Discard | Fallback::ShowQuestion => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastGood {
    index: QuestionIndex,
    text: String,
}

/// Combines a [`CombinedFrame`] into a [`Resolution`], remembering the last
/// known-good question text.
#[derive(Debug, Clone, Default)]
pub struct DisplayResolver {
    placeholders: Placeholders,
    last_good: Option<LastGood>,
}

impl DisplayResolver {
    #[must_use]
    pub fn new(placeholders: Placeholders) -> Self {
        Self {
            placeholders,
            last_good: None,
        }
    }

    /// Resolve one frame. Never returns empty text.
    pub fn resolve(&mut self, frame: &CombinedFrame) -> Resolution {
        self.resolve_with(frame, combine)
    }

    fn resolve_with(
        &mut self,
        frame: &CombinedFrame,
        step: impl FnOnce(&CombinedFrame) -> Result<Combined, SyncError>,
    ) -> Resolution {
        let combined = catch_unwind(AssertUnwindSafe(|| step(frame)));
        let result = match combined {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(index = frame.index, panic = %message, "resolver panicked; holding last good text");
                Err(SyncError::ResolverPanicked { message })
            }
        };

        match result {
            Ok(Combined {
                text,
                state,
                question_display,
            }) => {
                self.last_good = Some(LastGood {
                    index: frame.index,
                    text: question_display,
                });
                Resolution {
                    text,
                    state,
                    origin_index: frame.index,
                    absorbed: None,
                }
            }
            Err(err) => {
                let fallback = err.fallback();
                debug!(index = frame.index, kind = err.kind(), ?fallback, "resolver fallback");
                Resolution {
                    text: self.fallback_text(frame, fallback),
                    state: DisplayState::QuestionOnly,
                    origin_index: frame.index,
                    absorbed: Some(err),
                }
            }
        }
    }

    /// Last known-good question text, if it belongs to `index`.
    #[must_use]
    pub fn last_good_for(&self, index: QuestionIndex) -> Option<&str> {
        self.last_good
            .as_ref()
            .filter(|good| good.index == index)
            .map(|good| good.text.as_str())
    }

    #[must_use]
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    fn fallback_text(&self, frame: &CombinedFrame, fallback: Fallback) -> String {
        let question = frame.question_text.trim();
        let text = match fallback {
            Fallback::ShowQuestion if !question.is_empty() => {
                with_banner(question, &frame.banner_text, frame.multiple_answer)
            }
            Fallback::MissingLiteral => self.placeholders.missing.clone(),
            _ => self
                .last_good_for(frame.index)
                .map(str::to_owned)
                .unwrap_or_default(),
        };
        if text.trim().is_empty() {
            self.placeholders.loading.clone()
        } else {
            text
        }
    }
}

struct Combined {
    text: String,
    state: DisplayState,
    /// Question text as it would be shown (banner included).
    question_display: String,
}

/// Pure combine step.
fn combine(frame: &CombinedFrame) -> Result<Combined, SyncError> {
    let question = frame.question_text.trim();
    if question.is_empty() {
        return Err(SyncError::EmptyUpstream { index: frame.index });
    }
    let question_display = with_banner(question, &frame.banner_text, frame.multiple_answer);
    let show_question = |state| {
        Ok(Combined {
            text: question_display.clone(),
            state,
            question_display: question_display.clone(),
        })
    };

    if frame.navigating || frame.is_quiet() {
        return show_question(DisplayState::QuestionOnly);
    }

    let explanation = &frame.explanation;
    if explanation.index != Some(frame.index)
        || explanation.generation != frame.current_generation
    {
        return show_question(DisplayState::QuestionOnly);
    }

    let eligible = frame.mode.explanation_eligible(frame.should_show);
    if !eligible {
        return show_question(DisplayState::QuestionOnly);
    }

    if frame.locked || !explanation.gate_open || explanation.text.trim().is_empty() {
        return show_question(DisplayState::AwaitingExplanation);
    }

    Ok(Combined {
        text: explanation.text.clone(),
        state: DisplayState::ExplanationVisible,
        question_display: question_display.clone(),
    })
}

/// Append the correct-answer banner for multi-answer questions.
///
/// The banner is never appended twice and never to explanation text.
#[must_use]
pub fn with_banner(question: &str, banner: &str, multiple_answer: bool) -> String {
    let banner = banner.trim();
    if !multiple_answer || banner.is_empty() || question.contains(banner) {
        return question.to_owned();
    }
    format!("{question} {banner}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
