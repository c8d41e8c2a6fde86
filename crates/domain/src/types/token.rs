//! Cached OAuth2 bearer token

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// An access token issued for one identity.
///
/// The token value is redacted from `Debug` output so a cached token can be
/// logged structurally without leaking it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    value: String,
    /// Absolute expiry computed as `issued_at + expires_in`.
    pub expires_at: DateTime<Utc>,
    /// Identity the token was issued under.
    pub identity: String,
    /// Scope granted by the token endpoint, when it reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl BearerToken {
    /// Create a token expiring `expires_in_secs` after `issued_at`.
    ///
    /// Returns `None` when the expiry falls outside the representable range.
    #[must_use]
    pub fn new(
        value: impl Into<String>,
        identity: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
        scope: Option<String>,
    ) -> Option<Self> {
        let expires_at = issued_at.checked_add_signed(TimeDelta::try_seconds(expires_in_secs)?)?;
        Some(Self { value: value.into(), expires_at, identity: identity.into(), scope })
    }

    /// Raw token value for an `Authorization: Bearer` header.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the token may still be served at `now`.
    ///
    /// A token is usable only while `now < expires_at - refresh_buffer`; at
    /// or past that point it must be refetched even though it has not yet
    /// expired.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>, refresh_buffer_secs: u64) -> bool {
        i64::try_from(refresh_buffer_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|buffer| self.expires_at.checked_sub_signed(buffer))
            .is_some_and(|refresh_at| now < refresh_at)
    }

    /// Seconds until hard expiry (negative once expired).
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity)
            .field("scope", &self.scope)
            .finish()
    }
}
