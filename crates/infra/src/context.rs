//! Wiring of the components from one configuration

use std::sync::Arc;

use brokerlink_core::SecretFetcher;
use brokerlink_domain::{BrokerLinkConfig, Result};
use tracing::info;

use crate::auth::TokenManager;
use crate::credentials::CredentialStore;
use crate::http::HttpClient;
use crate::integrations::brokerage::BrokerageClient;
use crate::integrations::flex::ReportFetcher;

/// The credential store, token manager and report fetcher built from one
/// [`BrokerLinkConfig`] and one secret source.
///
/// Cheap to share behind an `Arc`; nothing here is a process-wide global.
#[derive(Debug)]
pub struct BrokerLink {
    config: BrokerLinkConfig,
    tokens: Arc<TokenManager>,
    reports: ReportFetcher,
}

impl BrokerLink {
    /// Validate `config` and build every component.
    ///
    /// # Errors
    /// `Config` when validation fails; transport errors if the HTTP client
    /// cannot be constructed.
    pub fn new(config: BrokerLinkConfig, secrets: Arc<dyn SecretFetcher>) -> Result<Self> {
        config.validate()?;

        let credentials =
            Arc::new(CredentialStore::new(config.identities.clone(), Arc::clone(&secrets)));
        let http = HttpClient::from_config(&config.http)?;
        let tokens = Arc::new(TokenManager::new(credentials, http, &config.auth));
        let reports = ReportFetcher::from_config(&config, secrets);

        info!(identities = config.identities.len(), "brokerlink initialised");
        Ok(Self { config, tokens, reports })
    }

    #[must_use]
    pub fn config(&self) -> &BrokerLinkConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    #[must_use]
    pub fn reports(&self) -> &ReportFetcher {
        &self.reports
    }

    /// REST client acting as `identity`.
    ///
    /// # Errors
    /// `IdentityNotFound` if `identity` is not configured.
    pub fn brokerage(&self, identity: &str) -> Result<BrokerageClient> {
        BrokerageClient::new(&self.config, Arc::clone(&self.tokens), identity)
    }
}
