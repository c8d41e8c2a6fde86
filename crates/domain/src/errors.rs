//! Error types used throughout the integration layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::BODY_PREVIEW_LIMIT;

/// Main error type for BrokerLink
///
/// Every failure path in the layer resolves to exactly one of these variants.
/// Variants that describe a remote response carry a truncated body preview
/// (see [`body_preview`]) rather than the full payload.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum BrokerLinkError {
    /// The secret backing an identity could not be fetched or decoded.
    #[error("Secret unavailable ({secret_id}): {reason}")]
    SecretUnavailable { secret_id: String, reason: String },

    #[error("Identity not configured: {0}")]
    IdentityNotFound(String),

    /// JWT construction or signing failed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The token endpoint (or an API call) rejected our credentials.
    #[error("Authentication error (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// Broken pipe, reset, aborted, timeout or TLS failure on a live handle.
    #[error("Transient connection error: {0}")]
    TransientConnection(String),

    /// Transport failure that is not in the transient vocabulary.
    #[error("Network error: {0}")]
    Network(String),

    /// Unexpected non-success status from a REST call.
    #[error("HTTP {status}: {body_preview}")]
    Http { status: u16, body_preview: String },

    #[error("Report template generation failed after {attempts} attempt(s): {detail}")]
    TemplateGenerationFailed { attempts: u32, detail: String },

    #[error("Malformed report template: {0}")]
    MalformedTemplate(String),

    #[error("Report generation failed after {attempts} attempt(s): {detail}")]
    ReportGenerationFailed { attempts: u32, detail: String },

    #[error("Malformed report export: {0}")]
    MalformedExport(String),

    /// The caller cancelled the operation between attempts.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerLinkError {
    /// Whether the error was classified as transient at the transport
    /// boundary.
    ///
    /// Only [`BrokerLinkError::TransientConnection`] qualifies; callers that
    /// need substring classification of other variants go through the
    /// supervisor's classifier.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientConnection(_))
    }

    /// Whether the error is a remote business-level or format failure of the
    /// report protocol.
    #[must_use]
    pub const fn is_report_failure(&self) -> bool {
        matches!(
            self,
            Self::TemplateGenerationFailed { .. }
                | Self::MalformedTemplate(_)
                | Self::ReportGenerationFailed { .. }
                | Self::MalformedExport(_)
        )
    }

    /// Build an [`BrokerLinkError::Http`] from a status and raw body.
    #[must_use]
    pub fn http(status: u16, body: &str) -> Self {
        Self::Http { status, body_preview: body_preview(body) }
    }
}

/// Truncate a remote payload for inclusion in an error or log line.
///
/// Cuts on a character boundary at [`BODY_PREVIEW_LIMIT`] characters and
/// appends `...` when anything was dropped.
#[must_use]
pub fn body_preview(body: &str) -> String {
    let trimmed = body.trim();
    let mut chars = trimmed.char_indices();
    match chars.nth(BODY_PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Result type alias for BrokerLink operations
pub type Result<T> = std::result::Result<T, BrokerLinkError>;
