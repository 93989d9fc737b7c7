use std::path::PathBuf;

use fetsync_runtime::ConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("engine config: {0}")]
    Config(#[from] ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(#[from] fetsync_runtime::logging::TryInitError),

    #[error("scenario file not found: {path}")]
    MissingScenario { path: PathBuf },

    #[error("invalid scenario: {message}")]
    InvalidScenario { message: String },

    #[error("step {step}: no explanation request with ticket {ticket}")]
    UnknownTicket { step: usize, ticket: usize },

    #[error("step {step}: ticket {ticket} was already delivered")]
    TicketAlreadyDelivered { step: usize, ticket: usize },

    #[error("{message}")]
    Exit { code: i32, message: String },
}

impl HarnessError {
    /// Process exit code: 2 for unusable input (scenario or config), 1 for
    /// environment failures, or the code carried by [`HarnessError::Exit`].
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code, .. } => *code,
            Self::InvalidScenario { .. }
            | Self::MissingScenario { .. }
            | Self::Json(_)
            | Self::Config(_)
            | Self::UnknownTicket { .. }
            | Self::TicketAlreadyDelivered { .. } => 2,
            Self::Io(_) | Self::Logging(_) => 1,
        }
    }

    #[must_use]
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self::Exit {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            message: message.into(),
        }
    }
}
