//! Named signing identities and the secret stores backing them
//!
//! [`CredentialStore`] maps an identity name ("broker", "advisor") to its
//! client id, key id and decoded RSA key. Key material comes from a
//! [`SecretFetcher`](brokerlink_core::SecretFetcher); three implementations
//! live in [`fetchers`].

pub mod fetchers;
mod identity;
mod store;

pub use fetchers::{EnvSecretFetcher, KeychainSecretFetcher, StaticSecretFetcher};
pub use identity::CredentialIdentity;
pub use store::CredentialStore;
