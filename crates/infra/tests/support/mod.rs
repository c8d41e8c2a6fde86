//! Shared fixtures for infra integration tests: RSA keys, identities and a
//! wiremock token endpoint that verifies client assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use brokerlink_domain::{BrokerLinkConfig, IdentityProfile};
use brokerlink_infra::StaticSecretFetcher;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const BROKER_KEY: &str = include_str!("../fixtures/broker_key.pem");
pub const BROKER_PUB: &str = include_str!("../fixtures/broker_key.pub.pem");
pub const ADVISOR_KEY: &str = include_str!("../fixtures/advisor_key.pem");
pub const ADVISOR_PUB: &str = include_str!("../fixtures/advisor_key.pub.pem");

pub const FLEX_TOKEN: &str = "flex-token-123";

pub fn identities() -> Vec<IdentityProfile> {
    vec![
        IdentityProfile::new("broker", "broker-key", "client-b", "kid-b"),
        IdentityProfile::new("advisor", "advisor-key", "client-a", "kid-a"),
    ]
}

pub fn secrets() -> StaticSecretFetcher {
    StaticSecretFetcher::new()
        .with_secret("broker-key", BROKER_KEY)
        .with_secret("advisor-key", ADVISOR_KEY)
        .with_secret("flex-service-token", FLEX_TOKEN)
}

/// Configuration pointing every endpoint at `server`, with short delays.
pub fn test_config(server: &MockServer) -> BrokerLinkConfig {
    let mut config = BrokerLinkConfig { identities: identities(), ..BrokerLinkConfig::default() };
    config.auth.token_url = format!("{}/token", server.uri());
    config.report.template_url = format!("{}/SendRequest", server.uri());
    config.report.max_attempts = 3;
    config.report.retry_delay_ms = 5;
    config.supervisor.retry_delay_ms = 5;
    config.http.timeout_secs = 1;
    config.api.base_url = format!("{}/v1", server.uri());
    config
}

/// Decode and verify a JWT signed by either fixture key.
pub fn verify_jwt(token: &str, audience: Option<&str>) -> Option<Value> {
    let mut validation = Validation::new(Algorithm::RS256);
    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    [BROKER_PUB, ADVISOR_PUB].iter().find_map(|pem| {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).ok()?;
        jsonwebtoken::decode::<Value>(token, &key, &validation).ok().map(|data| data.claims)
    })
}

/// Token endpoint double.
///
/// Issues `"<client_id>-<n>"` for every correctly signed assertion, where
/// `n` counts issued tokens across identities, and 401 otherwise.
#[derive(Clone)]
pub struct TokenEndpoint {
    audience: String,
    issued: Arc<AtomicUsize>,
    expires_in: i64,
    delay: Duration,
}

impl TokenEndpoint {
    pub fn new(server: &MockServer) -> Self {
        Self {
            audience: format!("{}/token", server.uri()),
            issued: Arc::new(AtomicUsize::new(0)),
            expires_in: 3600,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub async fn mount(&self, server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(self.clone())
            .mount(server)
            .await;
    }
}

/// Decode an `application/x-www-form-urlencoded` request body.
pub fn form_fields(body: &[u8]) -> Vec<(String, String)> {
    let form = format!("http://form.local/?{}", String::from_utf8_lossy(body));
    reqwest::Url::parse(&form)
        .map(|url| url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect())
        .unwrap_or_default()
}

impl Respond for TokenEndpoint {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let assertion = form_fields(&request.body)
            .into_iter()
            .find(|(key, _)| key == "client_assertion")
            .map(|(_, value)| value);

        let claims = assertion.and_then(|jwt| verify_jwt(&jwt, Some(&self.audience)));
        let Some(claims) = claims else {
            return ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_client"}"#);
        };

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let sub = claims["sub"].as_str().unwrap_or("unknown");
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({
                "access_token": format!("{sub}-{n}"),
                "token_type": "Bearer",
                "expires_in": self.expires_in,
                "scope": "sso-sessions.write",
            }))
            .set_delay(self.delay)
    }
}
