#![forbid(unsafe_code)]

//! fetsync harness
//!
//! Deterministic replay of explanation-display scenarios. A scenario file
//! scripts navigation, answering and explanation delivery against a virtual
//! clock; the runner records every published frame and checks that no frame
//! ever shows text belonging to a different question.
//!
//! - [`Scenario`] - JSON scenario format
//! - [`ScriptedQuiz`] - in-memory question and banner source
//! - [`DeferredProducer`] - explanation producer released by the script
//! - [`ScenarioRunner`] - replay plus leak detection
//! - [`cli`] - the `fetsync-harness` command line

pub mod cli;
pub mod error;
pub mod producer;
pub mod quiz;
pub mod runner;
pub mod scenario;

pub use cli::run_from_env;
pub use error::{HarnessError, Result};
pub use producer::DeferredProducer;
pub use quiz::ScriptedQuiz;
pub use runner::{FrameRecord, Leak, ScenarioReport, ScenarioRunner};
pub use scenario::{QuestionSpec, Scenario, Step};
