#![forbid(unsafe_code)]

//! JSON scenario format.
//!
//! A scenario lists the quiz questions, an optional engine config, and a
//! script of steps replayed against a virtual clock:
//!
//! ```json
//! {
//!   "name": "late result after navigation",
//!   "questions": [
//!     { "text": "Q0 text?", "explanation": "E0" },
//!     { "text": "Q1 text?", "explanation": "E1" }
//!   ],
//!   "steps": [
//!     { "op": "answer" },
//!     { "op": "request_explanation" },
//!     { "op": "navigate", "index": 1 },
//!     { "op": "complete_navigation", "index": 1 },
//!     { "op": "advance", "ms": 300 },
//!     { "op": "deliver", "ticket": 0 },
//!     { "op": "advance", "ms": 500 },
//!     { "op": "expect_text", "text": "Q1 text?" }
//!   ]
//! }
//! ```
//!
//! `request_explanation` hands out tickets numbered from 0 in request order;
//! `deliver` releases a ticket's completion, with the question's scripted
//! explanation unless `text` overrides it.

use std::path::Path;

use fetsync_runtime::{DisplayMode, EngineConfig, QuestionIndex};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

fn default_option_count() -> usize {
    4
}

/// One scripted question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionSpec {
    pub text: String,

    /// Formatted explanation; absent means the producer reports no data.
    #[serde(default)]
    pub explanation: Option<String>,

    /// Number of correct options; more than one makes it multi-answer.
    #[serde(default = "default_correct")]
    pub correct: usize,

    #[serde(default = "default_option_count")]
    pub option_count: usize,
}

fn default_correct() -> usize {
    1
}

impl QuestionSpec {
    #[must_use]
    pub fn is_multiple_answer(&self) -> bool {
        self.correct > 1
    }
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Navigation start event for `index`.
    Navigate { index: QuestionIndex },
    /// Navigation complete event for `index`.
    CompleteNavigation { index: QuestionIndex },
    /// Mark the active question answered and ask to show its explanation.
    Answer,
    SetShouldShow { show: bool },
    SetMode { mode: DisplayMode },
    /// Request the active question's explanation; yields the next ticket.
    RequestExplanation,
    /// Release the completion for `ticket`.
    Deliver {
        ticket: usize,
        #[serde(default)]
        text: Option<String>,
        /// Deliver "no explanation data" regardless of the script.
        #[serde(default)]
        missing: bool,
    },
    /// Move virtual time forward.
    Advance { ms: u64 },
    /// Assert the currently published text.
    ExpectText { text: String },
}

impl Step {
    /// Wire name of the step, as written in `op`.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::CompleteNavigation { .. } => "complete_navigation",
            Self::Answer => "answer",
            Self::SetShouldShow { .. } => "set_should_show",
            Self::SetMode { .. } => "set_mode",
            Self::RequestExplanation => "request_explanation",
            Self::Deliver { .. } => "deliver",
            Self::Advance { .. } => "advance",
            Self::ExpectText { .. } => "expect_text",
        }
    }
}

/// A complete scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub config: EngineConfig,

    pub questions: Vec<QuestionSpec>,

    #[serde(default)]
    pub start_index: QuestionIndex,

    pub steps: Vec<Step>,

    /// Virtual time allowed to settle after the last step.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    1_000
}

impl Scenario {
    /// Parse and validate a scenario from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(s)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load and validate a scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HarnessError::MissingScenario {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Structural checks the JSON schema cannot express.
    pub fn validate(&self) -> Result<()> {
        let config_errors = self.config.validate();
        if !config_errors.is_empty() {
            return Err(fetsync_runtime::ConfigError::Validation(config_errors).into());
        }

        let mut tickets = 0_usize;
        for (step_no, step) in self.steps.iter().enumerate() {
            match step {
                Step::Navigate { index } | Step::CompleteNavigation { index }
                    if *index > self.questions.len() =>
                {
                    // One index past the end models a question still loading.
                    return Err(HarnessError::invalid(format!(
                        "step {step_no}: index {index} is out of range"
                    )));
                }
                Step::RequestExplanation => tickets += 1,
                Step::Deliver { ticket, .. } if *ticket >= tickets => {
                    return Err(HarnessError::UnknownTicket {
                        step: step_no,
                        ticket: *ticket,
                    });
                }
                _ => {}
            }
        }
        if self.start_index >= self.questions.len() && !self.questions.is_empty() {
            return Err(HarnessError::invalid(format!(
                "start_index {} is out of range",
                self.start_index
            )));
        }
        Ok(())
    }
}
