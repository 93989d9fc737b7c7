#![forbid(unsafe_code)]

//! fetsync public facade crate.
//!
//! Re-exports the engine surface from `fetsync-runtime` and, with the
//! `harness` feature, the scenario replay tooling. Most hosts only need the
//! [`prelude`].
//!
//! ```rust,ignore
//! use fetsync::prelude::*;
//!
//! let engine = DisplayEngine::new(EngineConfig::default(), scheduler, collaborators);
//! engine.start(0);
//! let _watch = engine.display_stream().subscribe(|text| render(text));
//! ```

// --- Engine re-exports -----------------------------------------------------

pub use fetsync_runtime::{
    Collaborators, DisplayEngine, DisplayState, DisplayStream, NavigationReset, Resolution,
};

// --- Collaborator seams ----------------------------------------------------

pub use fetsync_runtime::{
    BannerSource, DisplayMode, DisplayModeState, ExplanationProducer, ExplanationRequest,
    ExplanationSink, NavigationEvent, NavigationPhase, QuestionIndex, QuestionSource,
};

// --- State primitives ------------------------------------------------------

pub use fetsync_runtime::{
    ExplanationChannel, GenerationLedger, GenerationToken, QuietZone, ResolveOutcome, SyncContext,
};

// --- Scheduling ------------------------------------------------------------

pub use fetsync_runtime::{FrameScheduler, TickScheduler, VirtualScheduler};

// --- Config and errors -----------------------------------------------------

pub use fetsync_runtime::{ConfigError, EngineConfig, StatsSnapshot, SyncError};

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        BannerSource, Collaborators, DisplayEngine, DisplayMode, DisplayModeState, DisplayState,
        EngineConfig, ExplanationProducer, ExplanationRequest, ExplanationSink, NavigationEvent,
        QuestionIndex, QuestionSource, SyncError, TickScheduler, VirtualScheduler,
    };

    pub use crate::runtime;

    #[cfg(feature = "harness")]
    pub use crate::harness;
}

pub use fetsync_runtime as runtime;

#[cfg(feature = "harness")]
pub use fetsync_harness as harness;
