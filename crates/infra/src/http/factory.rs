use std::sync::Arc;

use async_trait::async_trait;
use brokerlink_common::resilience::{ConnectionSupervisor, HandleFactory};
use brokerlink_domain::{BrokerLinkError, HttpConfig, SupervisorConfig};
use tracing::debug;

use super::client::HttpClient;

/// Builds a fresh connection pool for every supervised handle, so a rebuilt
/// handle never reuses a socket the failed one left behind.
#[derive(Debug, Clone)]
pub struct HttpHandleFactory {
    config: HttpConfig,
}

impl HttpHandleFactory {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl HandleFactory<HttpClient, BrokerLinkError> for HttpHandleFactory {
    async fn build(&self) -> Result<HttpClient, BrokerLinkError> {
        debug!(timeout_secs = self.config.timeout_secs, "building HTTP client handle");
        HttpClient::from_config(&self.config)
    }
}

/// A supervisor over plain HTTP handles, retrying only errors already
/// classified as `TransientConnection`.
pub fn supervised_http(
    name: &str,
    http: &HttpConfig,
    supervisor: &SupervisorConfig,
) -> ConnectionSupervisor<HttpClient, BrokerLinkError> {
    let factory: Arc<dyn HandleFactory<HttpClient, BrokerLinkError>> =
        Arc::new(HttpHandleFactory::new(http.clone()));

    ConnectionSupervisor::builder(name, factory)
        .max_retries(supervisor.max_retries)
        .retry_delay(supervisor.retry_delay())
        .stale_timeout(supervisor.stale_timeout())
        .classifier(BrokerLinkError::is_transient)
        .build()
}
