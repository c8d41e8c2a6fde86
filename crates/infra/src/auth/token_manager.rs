use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use brokerlink_common::resilience::{Clock, SystemClock};
use brokerlink_core::BearerTokenProvider;
use brokerlink_domain::constants::{CLIENT_CREDENTIALS_GRANT, JWT_BEARER_ASSERTION_TYPE};
use brokerlink_domain::{body_preview, AuthConfig, BearerToken, BrokerLinkError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::signer::RequestSigner;
use crate::credentials::CredentialStore;
use crate::http::{read_body, HttpClient};

type TokenSlot = Arc<Mutex<Option<BearerToken>>>;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
}

/// Per-identity bearer token cache over the client-credentials grant.
///
/// Each identity has its own slot guarded by an async mutex. The first
/// caller to find the slot empty or near expiry fetches while holding the
/// lock; concurrent callers for the same identity wait and then read the
/// fresh token, so at most one token request per identity is in flight.
/// Identities never share a slot.
pub struct TokenManager {
    credentials: Arc<CredentialStore>,
    signer: RequestSigner,
    http: HttpClient,
    token_url: String,
    scope: String,
    refresh_buffer_secs: u64,
    clock: Arc<dyn Clock>,
    slots: DashMap<String, TokenSlot>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .field("refresh_buffer_secs", &self.refresh_buffer_secs)
            .field("identities", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(credentials: Arc<CredentialStore>, http: HttpClient, config: &AuthConfig) -> Self {
        Self {
            credentials,
            signer: RequestSigner::new(config),
            http,
            token_url: config.token_url.clone(),
            scope: config.scope.clone(),
            refresh_buffer_secs: config.refresh_buffer_secs,
            clock: Arc::new(SystemClock),
            slots: DashMap::new(),
        }
    }

    /// Use `clock` for expiry checks and assertion timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.signer = self.signer.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }

    fn slot(&self, identity: &str) -> TokenSlot {
        Arc::clone(&*self.slots.entry(identity.to_string()).or_default())
    }

    /// Return a bearer token for `identity`, fetching one when the cached
    /// token is missing or within the refresh buffer of expiry.
    ///
    /// # Errors
    /// `IdentityNotFound`/`SecretUnavailable` from the credential store,
    /// `Signing` from the signer, `Auth` when the token endpoint answers
    /// with a non-200 status, and transport errors from the HTTP client.
    #[instrument(skip(self), fields(token_url = %self.token_url))]
    pub async fn get_bearer_token(&self, identity: &str) -> Result<String> {
        if !self.credentials.contains(identity) {
            return Err(BrokerLinkError::IdentityNotFound(identity.to_string()));
        }
        let slot = self.slot(identity);
        let mut cached = slot.lock().await;

        let now = self.now();
        if let Some(token) = cached.as_ref() {
            if token.is_usable_at(now, self.refresh_buffer_secs) {
                debug!(
                    identity,
                    expires_in_secs = token.seconds_until_expiry(now),
                    "using cached bearer token"
                );
                return Ok(token.value().to_string());
            }
            debug!(identity, "cached bearer token within refresh buffer, refetching");
        }
        *cached = None;

        let token = self.fetch_token(identity).await?;
        let value = token.value().to_string();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self, identity: &str) -> Result<BearerToken> {
        let credential = self.credentials.resolve(identity).await?;
        let assertion = self.signer.build_client_assertion(&credential)?;

        let form = [
            ("grant_type", CLIENT_CREDENTIALS_GRANT),
            ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let issued_at = self.now();
        let response =
            self.http.send(self.http.request(Method::POST, &self.token_url).form(&form)).await?;
        let status = response.status();
        let body = read_body(response).await?;

        if status != StatusCode::OK {
            warn!(identity, status = status.as_u16(), "token endpoint rejected client assertion");
            return Err(BrokerLinkError::Auth {
                status: status.as_u16(),
                message: body_preview(&body),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|err| {
            BrokerLinkError::Auth {
                status: status.as_u16(),
                message: format!("unparseable token response ({err}): {}", body_preview(&body)),
            }
        })?;

        let token = BearerToken::new(
            parsed.access_token,
            identity,
            issued_at,
            parsed.expires_in,
            parsed.scope,
        )
        .ok_or_else(|| BrokerLinkError::Auth {
            status: status.as_u16(),
            message: format!("invalid expires_in: {}", parsed.expires_in),
        })?;
        info!(identity, expires_at = %token.expires_at, "fetched bearer token");
        Ok(token)
    }

    /// Drop the cached token for `identity`.
    pub async fn invalidate(&self, identity: &str) {
        let slot = self.slots.get(identity).map(|entry| Arc::clone(&*entry));
        if let Some(slot) = slot {
            if slot.lock().await.take().is_some() {
                debug!(identity, "bearer token invalidated");
            }
        }
    }

    /// Drop every cached token.
    pub async fn invalidate_all(&self) {
        let slots: Vec<TokenSlot> =
            self.slots.iter().map(|entry| Arc::clone(entry.value())).collect();
        for slot in slots {
            slot.lock().await.take();
        }
        debug!("all bearer tokens invalidated");
    }

    /// Absolute expiry of the cached token for `identity`, if any.
    pub async fn cached_expiry(&self, identity: &str) -> Option<DateTime<Utc>> {
        let slot = self.slots.get(identity).map(|entry| Arc::clone(&*entry))?;
        let cached = slot.lock().await;
        cached.as_ref().map(|token| token.expires_at)
    }
}

#[async_trait]
impl BearerTokenProvider for TokenManager {
    async fn bearer_token(&self, identity: &str) -> Result<String> {
        self.get_bearer_token(identity).await
    }

    async fn invalidate(&self, identity: &str) {
        TokenManager::invalidate(self, identity).await;
    }
}
