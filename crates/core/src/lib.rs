//! # BrokerLink Core
//!
//! Pure logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for the collaborators the integration layer
//!   consumes: secret retrieval and bearer-token issuance
//! - The brokerage export parser, a pure function from bytes to a table
//!
//! ## Architecture Principles
//! - Only depends on `brokerlink-domain`
//! - No HTTP, keychain or filesystem code
//! - All external dependencies via traits

pub mod envelope;
pub mod ports;

pub use envelope::{parse_envelope, TabularEnvelopeParser};
pub use ports::{BearerTokenProvider, SecretFetcher};
