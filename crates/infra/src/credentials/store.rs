use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use brokerlink_core::SecretFetcher;
use brokerlink_domain::{BrokerLinkError, IdentityProfile, Result};
use moka::future::Cache;
use tracing::{debug, info};

use super::identity::CredentialIdentity;

/// Resolves identity names to decoded signing identities.
///
/// Each identity's secret is fetched and decoded once for the lifetime of
/// the store. Concurrent first resolutions of the same name share one fetch.
/// Failures are not cached; the next call retries the fetch.
pub struct CredentialStore {
    profiles: HashMap<String, IdentityProfile>,
    fetcher: Arc<dyn SecretFetcher>,
    decoded: Cache<String, Arc<CredentialIdentity>>,
}

impl CredentialStore {
    pub fn new(
        profiles: impl IntoIterator<Item = IdentityProfile>,
        fetcher: Arc<dyn SecretFetcher>,
    ) -> Self {
        let profiles: HashMap<_, _> =
            profiles.into_iter().map(|profile| (profile.name.clone(), profile)).collect();
        let capacity = u64::try_from(profiles.len()).unwrap_or(u64::MAX).max(1);

        Self { profiles, fetcher, decoded: Cache::builder().max_capacity(capacity).build() }
    }

    /// Whether `name` is a configured identity.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Configured identity names, sorted.
    #[must_use]
    pub fn identity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `name` to its signing identity.
    ///
    /// # Errors
    /// `IdentityNotFound` for an unconfigured name; `SecretUnavailable` when
    /// the secret cannot be fetched or decoded.
    pub async fn resolve(&self, name: &str) -> Result<Arc<CredentialIdentity>> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| BrokerLinkError::IdentityNotFound(name.to_string()))?;

        self.decoded
            .try_get_with(name.to_string(), self.load(profile))
            .await
            .map_err(|err| (*err).clone())
    }

    async fn load(&self, profile: &IdentityProfile) -> Result<Arc<CredentialIdentity>> {
        debug!(identity = %profile.name, secret_id = %profile.secret_id, "fetching signing key");
        let pem = self.fetcher.get_secret(&profile.secret_id).await?;
        let identity = CredentialIdentity::from_pem(profile, &pem)?;
        info!(identity = %profile.name, key_id = %profile.key_id, "signing identity loaded");
        Ok(Arc::new(identity))
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("identities", &self.identity_names())
            .field("decoded", &self.decoded.entry_count())
            .finish_non_exhaustive()
    }
}
