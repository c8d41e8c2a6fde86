//! # BrokerLink Infrastructure
//!
//! Implementations of everything in BrokerLink that performs I/O.
//!
//! This crate contains:
//! - Configuration loading (environment, `.env`, TOML/JSON files)
//! - Secret fetchers and the credential store
//! - RS256 request signing and the per-identity token manager
//! - The Flex two-phase report fetcher
//! - The brokerage REST client
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Implements traits defined in `brokerlink-core`
//! - Wraps every long-lived HTTP handle in a `brokerlink-common`
//!   `ConnectionSupervisor`
//! - Maps all external errors to `brokerlink_domain::BrokerLinkError`

pub mod auth;
pub mod config;
pub mod context;
pub mod credentials;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;

// Re-export commonly used items
pub use auth::{RequestSigner, SignedAssertion, TokenManager};
pub use context::BrokerLink;
pub use credentials::{
    CredentialIdentity, CredentialStore, EnvSecretFetcher, KeychainSecretFetcher,
    StaticSecretFetcher,
};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use integrations::brokerage::BrokerageClient;
pub use integrations::flex::ReportFetcher;
pub use observability::{init_tracing, LogFormat};
