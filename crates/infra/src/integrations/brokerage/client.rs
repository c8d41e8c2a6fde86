use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use brokerlink_common::resilience::{ConnectionSupervisor, HandleFactory};
use brokerlink_domain::constants::SIGNED_BODY_CONTENT_TYPE;
use brokerlink_domain::{body_preview, BrokerLinkConfig, BrokerLinkError, HttpConfig, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::TokenManager;
use crate::http::{read_body, HttpClient};

/// A live API session: one HTTP connection pool plus the bearer token of the
/// identity it was built for.
///
/// Sessions are never mutated. Switching identity or recovering from a
/// connection failure replaces the whole session.
pub struct BrokerageSession {
    http: HttpClient,
    identity: String,
    bearer: String,
}

impl BrokerageSession {
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Debug for BrokerageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerageSession")
            .field("identity", &self.identity)
            .field("bearer", &"<redacted>")
            .finish_non_exhaustive()
    }
}

struct SessionFactory {
    tokens: Arc<TokenManager>,
    http: HttpConfig,
    active: Arc<RwLock<String>>,
}

#[async_trait]
impl HandleFactory<BrokerageSession, BrokerLinkError> for SessionFactory {
    async fn build(&self) -> Result<BrokerageSession> {
        let identity = self.active.read().await.clone();
        let bearer = self.tokens.get_bearer_token(&identity).await?;
        let http = HttpClient::from_config(&self.http)?;
        debug!(identity = %identity, "brokerage session built");
        Ok(BrokerageSession { http, identity, bearer })
    }

    /// A discarded session's token may be what broke it; the next session
    /// must not reuse it.
    async fn on_discard(&self, session: &BrokerageSession) {
        self.tokens.invalidate(&session.identity).await;
    }
}

/// REST client for the brokerage API.
///
/// Every call runs through a [`ConnectionSupervisor`] that rebuilds the
/// session after transient connection failures. Mutating calls send their
/// payload as a JWT signed by the active identity
/// (`Content-Type: application/jwt`).
pub struct BrokerageClient {
    base_url: String,
    tokens: Arc<TokenManager>,
    active: Arc<RwLock<String>>,
    session: ConnectionSupervisor<BrokerageSession, BrokerLinkError>,
}

impl fmt::Debug for BrokerageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerageClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl BrokerageClient {
    /// Client acting as `identity` against `config.api.base_url`.
    ///
    /// # Errors
    /// `IdentityNotFound` if `identity` is not configured.
    pub fn new(
        config: &BrokerLinkConfig,
        tokens: Arc<TokenManager>,
        identity: impl Into<String>,
    ) -> Result<Self> {
        let identity = identity.into();
        if !tokens.credentials().contains(&identity) {
            return Err(BrokerLinkError::IdentityNotFound(identity));
        }

        let active = Arc::new(RwLock::new(identity));
        let factory: Arc<dyn HandleFactory<BrokerageSession, BrokerLinkError>> =
            Arc::new(SessionFactory {
                tokens: Arc::clone(&tokens),
                http: config.http.clone(),
                active: Arc::clone(&active),
            });
        let session = ConnectionSupervisor::builder("brokerage", factory)
            .max_retries(config.supervisor.max_retries)
            .retry_delay(config.supervisor.retry_delay())
            .stale_timeout(config.supervisor.stale_timeout())
            .classifier(BrokerLinkError::is_transient)
            .build();

        Ok(Self { base_url: config.api.base_url.clone(), tokens, active, session })
    }

    /// Identity new sessions are built under.
    pub async fn active_identity(&self) -> String {
        self.active.read().await.clone()
    }

    /// Act as `identity` from the next call on.
    ///
    /// The previous identity's cached token is discarded and the current
    /// session is marked stale, so no request after this returns is sent
    /// with the previous identity's credentials. Returns the previous
    /// identity.
    ///
    /// # Errors
    /// `IdentityNotFound` if `identity` is not configured; the active
    /// identity is left unchanged.
    pub async fn switch_identity(&self, identity: &str) -> Result<String> {
        if !self.tokens.credentials().contains(identity) {
            return Err(BrokerLinkError::IdentityNotFound(identity.to_string()));
        }

        let previous = {
            let mut active = self.active.write().await;
            std::mem::replace(&mut *active, identity.to_string())
        };
        self.tokens.invalidate(&previous).await;
        self.session.force_refresh();
        info!(from = %previous, to = %identity, "switched brokerage identity");
        Ok(previous)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// GET `path` and decode the JSON response.
    ///
    /// # Errors
    /// `Auth` on 401/403, `Http` on any other non-success status,
    /// `Internal` if the body is not the expected JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let body = self
            .session
            .execute(|session| {
                let request = session.http.request(Method::GET, &url).bearer_auth(&session.bearer);
                async move { send_checked(&session.http, request).await }
            })
            .await?;

        decode_json(&body)
    }

    /// POST `body`, signed by the active identity, to `path`.
    ///
    /// # Errors
    /// As for [`get_json`](Self::get_json), plus `Signing`.
    pub async fn post_signed(&self, path: &str, body: Map<String, Value>) -> Result<Value> {
        self.send_signed(Method::POST, path, body).await
    }

    /// PATCH `body`, signed by the active identity, to `path`.
    ///
    /// # Errors
    /// As for [`post_signed`](Self::post_signed).
    pub async fn patch_signed(&self, path: &str, body: Map<String, Value>) -> Result<Value> {
        self.send_signed(Method::PATCH, path, body).await
    }

    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        body: Map<String, Value>,
    ) -> Result<Value> {
        let url = self.url(path);
        let response = self
            .session
            .execute(|session| {
                let tokens = Arc::clone(&self.tokens);
                let method = method.clone();
                let url = url.clone();
                let body = body.clone();
                async move {
                    let identity = tokens.credentials().resolve(session.identity()).await?;
                    let signed = tokens.signer().sign_request_body(&identity, body)?;
                    let request = session
                        .http
                        .request(method, &url)
                        .bearer_auth(&session.bearer)
                        .header(CONTENT_TYPE, SIGNED_BODY_CONTENT_TYPE)
                        .body(signed.into_string());
                    send_checked(&session.http, request).await
                }
            })
            .await?;

        decode_json(&response)
    }
}

/// Send once and turn non-success statuses into errors.
async fn send_checked(http: &HttpClient, request: reqwest::RequestBuilder) -> Result<String> {
    let response = http.send(request).await?;
    let status = response.status();
    let body = read_body(response).await?;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BrokerLinkError::Auth {
            status: status.as_u16(),
            message: body_preview(&body),
        }),
        status if !status.is_success() => Err(BrokerLinkError::http(status.as_u16(), &body)),
        _ => Ok(body),
    }
}

fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|err| {
        BrokerLinkError::Internal(format!(
            "unexpected response body ({err}): {}",
            body_preview(body)
        ))
    })
}
