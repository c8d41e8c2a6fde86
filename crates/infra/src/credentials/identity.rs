use std::fmt;

use brokerlink_domain::{BrokerLinkError, IdentityProfile, Result};
use jsonwebtoken::EncodingKey;

/// One named signing identity with its decoded private key.
///
/// Immutable once built and shared behind an `Arc`; signing and token
/// operations take it explicitly rather than reading ambient client/key ids.
#[derive(Clone)]
pub struct CredentialIdentity {
    name: String,
    client_id: String,
    key_id: String,
    encoding_key: EncodingKey,
}

impl CredentialIdentity {
    /// Decode `pem` (PKCS#1 or PKCS#8 RSA private key) for `profile`.
    ///
    /// # Errors
    /// `SecretUnavailable` naming the profile's secret when the bytes are not
    /// a usable RSA key.
    pub fn from_pem(profile: &IdentityProfile, pem: &[u8]) -> Result<Self> {
        let encoding_key =
            EncodingKey::from_rsa_pem(pem).map_err(|err| BrokerLinkError::SecretUnavailable {
                secret_id: profile.secret_id.clone(),
                reason: format!("private key is not a valid RSA PEM: {err}"),
            })?;

        Ok(Self {
            name: profile.name.clone(),
            client_id: profile.client_id.clone(),
            key_id: profile.key_id.clone(),
            encoding_key,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

impl fmt::Debug for CredentialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIdentity")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .field("encoding_key", &"[REDACTED]")
            .finish()
    }
}
