#![forbid(unsafe_code)]

//! Engine configuration as data.
//!
//! Every timing constant and fallback literal the engine uses lives in one
//! [`EngineConfig`] that can be loaded from TOML or JSON at startup.
//!
//! # Loading
//!
//! ```toml
//! # fetsync.toml
//! quiet_window_ms = 150
//! frame_interval_ms = 16
//! settle_ticks = 2
//! loading_placeholder = "Loading question..."
//! ```
//!
//! ```rust,ignore
//! let config = EngineConfig::from_toml_file("fetsync.toml")?;
//! let config = EngineConfig::from_json_str(json)?;
//! ```
//!
//! Loaders validate before returning; a config built in code can be checked
//! with [`EngineConfig::validate`].

#[cfg(feature = "engine-config")]
use std::path::Path;

#[cfg(feature = "engine-config")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shown while the active question's text has not loaded yet.
pub const DEFAULT_LOADING_PLACEHOLDER: &str = "Loading question...";

/// Shown when the producer has no explanation data for a question.
pub const DEFAULT_MISSING_EXPLANATION: &str = "No explanation available";

/// Tunables for the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "engine-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "engine-config", serde(default, deny_unknown_fields))]
pub struct EngineConfig {
    /// Settle window opened after each navigation.
    pub quiet_window_ms: u64,

    /// Render-tick period. Sizes the settle delay and the
    /// [`FrameScheduler`](crate::scheduler::FrameScheduler) hosts build from
    /// config.
    pub frame_interval_ms: u64,

    /// Render ticks between a navigation and its channel unlock.
    pub settle_ticks: u32,

    pub loading_placeholder: String,

    pub missing_explanation_text: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: 150,
            frame_interval_ms: 16,
            settle_ticks: 2,
            loading_placeholder: DEFAULT_LOADING_PLACEHOLDER.to_owned(),
            missing_explanation_text: DEFAULT_MISSING_EXPLANATION.to_owned(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML string.
    #[cfg(feature = "engine-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.into_validated()
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "engine-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "engine-config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.into_validated()
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "engine-config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Validate all parameters.
    ///
    /// Returns a list of violations. An empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.frame_interval_ms == 0 {
            errors.push("frame_interval_ms must be > 0".into());
        }
        if self.settle_ticks == 0 {
            errors.push("settle_ticks must be > 0".into());
        }
        if self.quiet_window_ms > 10_000 {
            errors.push(format!(
                "quiet_window_ms must be <= 10000, got {}",
                self.quiet_window_ms
            ));
        }
        if self.loading_placeholder.trim().is_empty() {
            errors.push("loading_placeholder must not be blank".into());
        }
        if self.missing_explanation_text.trim().is_empty() {
            errors.push("missing_explanation_text must not be blank".into());
        }

        errors
    }

    /// Milliseconds between a navigation and its unlock attempt.
    #[must_use]
    pub fn settle_delay_ms(&self) -> u64 {
        self.frame_interval_ms
            .saturating_mul(u64::from(self.settle_ticks.max(1)))
    }

    #[cfg(feature = "engine-config")]
    fn into_validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors that can occur when loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "engine-config")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "engine-config")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
