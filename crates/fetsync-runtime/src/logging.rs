#![forbid(unsafe_code)]

//! Structured log output.
//!
//! Installs a global `tracing-subscriber` formatter filtered by the
//! `FETSYNC_LOG` environment variable (same syntax as `RUST_LOG`, default
//! `info`). Library code only emits events; hosts opt into output here.
//!
//! ```rust,ignore
//! fetsync_runtime::logging::init(LogFormat::Json)?;
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use tracing_subscriber::util::TryInitError;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "FETSYNC_LOG";

/// Output format for [`init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable single-line output.
    #[default]
    Compact,
}

/// Filter from `FETSYNC_LOG`, falling back to `info`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber writing to stderr.
///
/// Fails if a global subscriber is already set.
pub fn init(format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter());
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
}
