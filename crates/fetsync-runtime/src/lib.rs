#![forbid(unsafe_code)]

//! fetsync runtime
//!
//! The explanation-display synchronization engine: decides, at any instant,
//! whether a quiz question or its asynchronously produced explanation should
//! be shown, while the user navigates between questions and explanation text
//! arrives late, out of order, or not at all.
//!
//! # Key Components
//!
//! - [`GenerationLedger`] - monotonic token source; one bump per navigation
//! - [`ExplanationChannel`] - per-question explanation records plus the FET lock
//! - [`QuietZone`] - settle window after navigation
//! - [`DisplayResolver`] - combines one [`CombinedFrame`] into the text to render
//! - [`ResetCoordinator`] - bump, lock, purge and delayed unlock on navigation
//! - [`DisplayEngine`] - wires collaborators and publishes a [`DisplayStream`]
//!
//! # Guarantees
//!
//! Text belonging to one question never renders against another, the
//! display never goes blank, and bursts of updates inside one render tick
//! collapse into a single published frame.
//!
//! Everything is single-threaded (`Rc`/`RefCell`/`Cell`). Time and render
//! ticks come from a [`TickScheduler`]; tests drive a [`VirtualScheduler`].

pub mod channel;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod ledger;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod quiet_zone;
pub mod reactive;
pub mod resolver;
pub mod scheduler;
pub mod stats;

pub use channel::{ExplanationChannel, ExplanationRecord, QuestionIndex, ResolveOutcome};
pub use collaborators::{
    BannerSource, DisplayMode, DisplayModeState, ExplanationProducer, ExplanationRequest,
    ExplanationSink, NavigationEvent, NavigationPhase, QuestionSource,
};
pub use config::{ConfigError, EngineConfig};
pub use context::SyncContext;
pub use coordinator::{NavigationReset, ResetCoordinator};
pub use engine::{Collaborators, DisplayEngine, DisplayStream};
pub use error::{Fallback, SyncError};
pub use ledger::{GenerationLedger, GenerationToken};
pub use quiet_zone::{QuietWindow, QuietZone};
pub use reactive::{BatchScope, Observable, Subscription};
pub use resolver::{CombinedFrame, DisplayResolver, DisplayState, ExplanationView, Resolution};
pub use scheduler::{
    Clock, FrameScheduler, ManualClock, MonotonicClock, TickScheduler, TimerId, TimerQueue,
    VirtualScheduler,
};
pub use stats::{StatsSnapshot, SyncStats};
