//! Infrastructure error conversions
//!
//! Every external error type (reqwest, keyring, jsonwebtoken) is mapped to
//! exactly one [`BrokerLinkError`] variant here, so call sites only ever see
//! the domain taxonomy.

mod conversions;

pub use conversions::{keyring_unavailable, InfraError};
