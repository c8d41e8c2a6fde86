use std::fmt;
use std::sync::Arc;

use brokerlink_common::resilience::{Clock, SystemClock};
use brokerlink_domain::{AuthConfig, BrokerLinkError, Result};
use jsonwebtoken::{Algorithm, Header};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::credentials::CredentialIdentity;
use crate::errors::InfraError;

/// A compact-serialized, signed JWT.
///
/// Built fresh for every use and never cached. `Debug` hides the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedAssertion(String);

impl SignedAssertion {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignedAssertion([REDACTED])")
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Stateless RS256 signer.
///
/// Client assertions are valid from `now - backdate` to `now + lifetime`,
/// a deliberately narrow window matching the token endpoint's clock-skew
/// tolerance. Signed bodies expire `body_lifetime` seconds after `now`.
#[derive(Clone)]
pub struct RequestSigner {
    audience: String,
    backdate_secs: u64,
    lifetime_secs: u64,
    body_lifetime_secs: u64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("audience", &self.audience)
            .field("backdate_secs", &self.backdate_secs)
            .field("lifetime_secs", &self.lifetime_secs)
            .field("body_lifetime_secs", &self.body_lifetime_secs)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Signer whose assertions target `config.token_url`.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            audience: config.token_url.clone(),
            backdate_secs: config.assertion_backdate_secs,
            lifetime_secs: config.assertion_lifetime_secs,
            body_lifetime_secs: config.body_signature_lifetime_secs,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The `aud` claim of every client assertion.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Build a client assertion for the token endpoint.
    ///
    /// Claims: `iss = sub = client_id`, `aud = token_url`,
    /// `iat = now - backdate`, `exp = now + lifetime`; header `kid = key_id`.
    ///
    /// # Errors
    /// `Signing` when the key cannot produce an RS256 signature.
    pub fn build_client_assertion(&self, identity: &CredentialIdentity) -> Result<SignedAssertion> {
        let now = self.clock.unix_seconds();
        let claims = AssertionClaims {
            iss: identity.client_id(),
            sub: identity.client_id(),
            aud: &self.audience,
            iat: now.saturating_sub(self.backdate_secs),
            exp: now + self.lifetime_secs,
        };

        let assertion = self.sign(identity, &claims)?;
        debug!(identity = identity.name(), kid = identity.key_id(), "built client assertion");
        Ok(assertion)
    }

    /// Sign `body` as the claims of a self-authenticating request payload.
    ///
    /// `iss`, `iat` and `exp` are set by the signer and override any values
    /// already present in `body`.
    ///
    /// # Errors
    /// `Signing` when the key cannot produce an RS256 signature.
    pub fn sign_request_body(
        &self,
        identity: &CredentialIdentity,
        mut body: Map<String, Value>,
    ) -> Result<SignedAssertion> {
        let now = self.clock.unix_seconds();
        body.insert("iss".into(), Value::from(identity.client_id()));
        body.insert("iat".into(), Value::from(now));
        body.insert("exp".into(), Value::from(now + self.body_lifetime_secs));

        let signed = self.sign(identity, &body)?;
        debug!(identity = identity.name(), fields = body.len(), "signed request body");
        Ok(signed)
    }

    fn sign<T: Serialize>(
        &self,
        identity: &CredentialIdentity,
        claims: &T,
    ) -> Result<SignedAssertion> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(identity.key_id().to_string());

        jsonwebtoken::encode(&header, claims, identity.encoding_key())
            .map(SignedAssertion)
            .map_err(|err| BrokerLinkError::from(InfraError::from(err)))
    }
}
