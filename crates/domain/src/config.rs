//! Configuration structures
//!
//! Every field has a documented default so a partial TOML/JSON file (or an
//! empty one) deserializes into a usable configuration. Loading lives in
//! `brokerlink-infra`; this module only owns the shape and validation.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BrokerLinkError, Result};

/// Root configuration for the integration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerLinkConfig {
    pub auth: AuthConfig,
    pub identities: Vec<IdentityProfile>,
    pub supervisor: SupervisorConfig,
    pub report: ReportConfig,
    pub http: HttpConfig,
    pub api: ApiConfig,
}

impl BrokerLinkConfig {
    /// Check cross-field invariants that serde defaults cannot express.
    ///
    /// # Errors
    /// Returns `BrokerLinkError::Config` on zero retry budgets, empty
    /// endpoint URLs, duplicate identity names, or a handle stale timeout
    /// longer than the token refresh buffer.
    pub fn validate(&self) -> Result<()> {
        if self.auth.token_url.trim().is_empty() {
            return Err(BrokerLinkError::Config("auth.token_url must not be empty".into()));
        }
        if self.report.template_url.trim().is_empty() {
            return Err(BrokerLinkError::Config("report.template_url must not be empty".into()));
        }
        if self.supervisor.max_retries == 0 {
            return Err(BrokerLinkError::Config(
                "supervisor.max_retries must be greater than 0".into(),
            ));
        }
        if self.report.max_attempts == 0 {
            return Err(BrokerLinkError::Config(
                "report.max_attempts must be greater than 0".into(),
            ));
        }

        if self.supervisor.stale_timeout_secs > self.auth.refresh_buffer_secs {
            return Err(BrokerLinkError::Config(format!(
                "supervisor.stale_timeout_secs ({}) must not exceed auth.refresh_buffer_secs ({}); \
                 sessions would outlive their bearer token",
                self.supervisor.stale_timeout_secs, self.auth.refresh_buffer_secs
            )));
        }

        let mut seen = HashSet::new();
        for identity in &self.identities {
            if !seen.insert(identity.name.as_str()) {
                return Err(BrokerLinkError::Config(format!(
                    "duplicate identity name: {}",
                    identity.name
                )));
            }
        }

        Ok(())
    }

    /// Look up an identity profile by name.
    #[must_use]
    pub fn identity(&self, name: &str) -> Option<&IdentityProfile> {
        self.identities.iter().find(|profile| profile.name == name)
    }
}

/// Token endpoint and JWT timing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth token endpoint; also the `aud` of every client assertion.
    pub token_url: String,
    /// Fixed scope string sent with every token request.
    pub scope: String,
    /// A cached token is reused only while `now < expiry - refresh_buffer`.
    pub refresh_buffer_secs: u64,
    /// Client assertions are issued this far in the past (`iat = now - n`).
    pub assertion_backdate_secs: u64,
    /// Client assertions expire this long after `now`.
    pub assertion_lifetime_secs: u64,
    /// Signed request bodies expire this long after `now`.
    pub body_signature_lifetime_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: "https://api.ibkr.com/oauth2/api/v1/token".to_string(),
            scope: "sso-sessions.write".to_string(),
            refresh_buffer_secs: 300,
            assertion_backdate_secs: 10,
            assertion_lifetime_secs: 20,
            body_signature_lifetime_secs: 1000,
        }
    }
}

/// Where a named identity's signing material lives.
///
/// The private key itself is never part of configuration; `secret_id` names
/// it in the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub name: String,
    pub secret_id: String,
    pub client_id: String,
    pub key_id: String,
}

impl IdentityProfile {
    pub fn new(
        name: impl Into<String>,
        secret_id: impl Into<String>,
        client_id: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            secret_id: secret_id.into(),
            client_id: client_id.into(),
            key_id: key_id.into(),
        }
    }
}

/// Retry and staleness bounds for supervised handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Total attempts per supervised operation (initial try included).
    pub max_retries: u32,
    /// Base delay; attempt `n` (0-based) sleeps `delay * (n + 1)`.
    pub retry_delay_ms: u64,
    /// Handles older than this are rebuilt before use.
    pub stale_timeout_secs: u64,
}

impl SupervisorConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub const fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { max_retries: 3, retry_delay_ms: 1000, stale_timeout_secs: 300 }
    }
}

/// Flex report protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Phase-1 endpoint (`SendRequest`).
    pub template_url: String,
    /// Flex web-service protocol version sent as `v`.
    pub version: u32,
    /// Attempts per phase; budgets never carry over between phases.
    pub max_attempts: u32,
    /// Fixed delay between attempts within a phase.
    pub retry_delay_ms: u64,
    /// Secret holding the Flex web-service token.
    pub service_token_secret_id: String,
}

impl ReportConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            template_url: "https://ndcdyn.interactivebrokers.com/AccountManagement/FlexWebService/SendRequest".to_string(),
            version: 3,
            max_attempts: 5,
            retry_delay_ms: 1000,
            service_token_secret_id: "flex-service-token".to_string(),
        }
    }
}

/// Transport settings shared by every HTTP handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Total per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl HttpConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("brokerlink/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Brokerage REST API location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: "https://api.ibkr.com/gw/api/v1".to_string() }
    }
}
