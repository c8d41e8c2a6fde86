//! `SecretFetcher` implementations
//!
//! - [`StaticSecretFetcher`]: in-memory map, for tests and embedding
//! - [`EnvSecretFetcher`]: `BROKERLINK_SECRET_<ID>` environment variables
//! - [`KeychainSecretFetcher`]: platform keychain via `keyring`

use std::collections::HashMap;

use async_trait::async_trait;
use brokerlink_core::SecretFetcher;
use brokerlink_domain::{BrokerLinkError, Result};
use keyring::Entry;

use crate::errors::keyring_unavailable;

/// Prefix for secrets read by [`EnvSecretFetcher`].
pub const SECRET_ENV_PREFIX: &str = "BROKERLINK_SECRET_";

/// Default keychain service name.
pub const KEYCHAIN_SERVICE: &str = "brokerlink";

fn unavailable(secret_id: &str, reason: impl Into<String>) -> BrokerLinkError {
    BrokerLinkError::SecretUnavailable { secret_id: secret_id.to_string(), reason: reason.into() }
}

/// Secrets held in memory.
#[derive(Default, Clone)]
pub struct StaticSecretFetcher {
    secrets: HashMap<String, Vec<u8>>,
}

impl StaticSecretFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_secret(mut self, secret_id: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(secret_id.into(), value.into());
        self
    }
}

impl std::fmt::Debug for StaticSecretFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.secrets.keys().collect();
        ids.sort();
        f.debug_struct("StaticSecretFetcher").field("secret_ids", &ids).finish()
    }
}

#[async_trait]
impl SecretFetcher for StaticSecretFetcher {
    async fn get_secret(&self, secret_id: &str) -> Result<Vec<u8>> {
        self.secrets.get(secret_id).cloned().ok_or_else(|| unavailable(secret_id, "no such secret"))
    }
}

/// Reads secret `broker-key` from `BROKERLINK_SECRET_BROKER_KEY`.
///
/// Literal `\n` sequences are expanded so a PEM fits on one `.env` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretFetcher;

impl EnvSecretFetcher {
    /// Environment variable consulted for `secret_id`.
    #[must_use]
    pub fn var_name(secret_id: &str) -> String {
        let suffix: String = secret_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{SECRET_ENV_PREFIX}{suffix}")
    }
}

#[async_trait]
impl SecretFetcher for EnvSecretFetcher {
    async fn get_secret(&self, secret_id: &str) -> Result<Vec<u8>> {
        let name = Self::var_name(secret_id);
        match std::env::var(&name) {
            Ok(value) if !value.trim().is_empty() => Ok(value.replace("\\n", "\n").into_bytes()),
            Ok(_) => Err(unavailable(secret_id, format!("{name} is empty"))),
            Err(err) => Err(unavailable(secret_id, format!("{name}: {err}"))),
        }
    }
}

/// Secrets stored in the platform keychain under one service name.
///
/// Keychain calls block, so they run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct KeychainSecretFetcher {
    service: String,
}

impl KeychainSecretFetcher {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Default for KeychainSecretFetcher {
    fn default() -> Self {
        Self::new(KEYCHAIN_SERVICE)
    }
}

#[async_trait]
impl SecretFetcher for KeychainSecretFetcher {
    async fn get_secret(&self, secret_id: &str) -> Result<Vec<u8>> {
        let service = self.service.clone();
        let id = secret_id.to_string();

        let lookup = tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &id).map_err(|err| keyring_unavailable(&id, err))?;
            entry.get_secret().map_err(|err| keyring_unavailable(&id, err))
        })
        .await;

        match lookup {
            Ok(result) => result,
            Err(join_err) => Err(unavailable(secret_id, format!("keychain task failed: {join_err}"))),
        }
    }
}
