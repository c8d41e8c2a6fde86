//! Port interfaces for external collaborators

use async_trait::async_trait;
use brokerlink_domain::Result;

/// Opaque secret retrieval (`GetSecret(name) -> bytes`).
///
/// Implementations must map every failure to
/// `BrokerLinkError::SecretUnavailable`; callers treat it as fatal for the
/// identity or service that needed the secret.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    /// Fetch the raw bytes stored under `secret_id`.
    async fn get_secret(&self, secret_id: &str) -> Result<Vec<u8>>;
}

/// Issues bearer tokens for named identities.
#[async_trait]
pub trait BearerTokenProvider: Send + Sync {
    /// Return a usable access token for `identity`, fetching one if needed.
    async fn bearer_token(&self, identity: &str) -> Result<String>;

    /// Drop any cached token for `identity` so the next call fetches anew.
    async fn invalidate(&self, identity: &str);
}
