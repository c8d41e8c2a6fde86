//! OAuth2 client-credentials authentication with signed JWT assertions
//!
//! - [`RequestSigner`] builds RS256 client assertions and signed request
//!   bodies for a [`CredentialIdentity`](crate::credentials::CredentialIdentity)
//! - [`TokenManager`] exchanges assertions for bearer tokens and caches them
//!   per identity

mod signer;
mod token_manager;

pub use signer::{RequestSigner, SignedAssertion};
pub use token_manager::TokenManager;
