//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events; binaries and tests embedding
//! the layer call [`init_tracing`] once to see them. The filter comes from
//! `RUST_LOG` and defaults to `info`.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Output format of the fmt subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "pretty" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(ObservabilityError::UnknownFormat(other.to_string())),
        }
    }
}

/// Tracing setup error
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("Unknown log format: {0} (expected 'plain' or 'json')")]
    UnknownFormat(String),

    /// A global subscriber was already installed (by us or the host).
    #[error("Tracing subscriber already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Install a global fmt subscriber.
///
/// # Errors
/// [`ObservabilityError::AlreadyInitialised`] when a global subscriber
/// exists; callers that may run twice can ignore it.
pub fn init_tracing(format: LogFormat) -> Result<(), ObservabilityError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| ObservabilityError::AlreadyInitialised(err.to_string()))
}
