//! Conversions from external infrastructure errors into domain errors.

use std::error::Error as StdError;

use brokerlink_common::resilience::{SupervisorError, VocabularyClassifier};
use brokerlink_domain::BrokerLinkError;
use jsonwebtoken::errors::Error as JwtError;
use keyring::Error as KeyringError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub BrokerLinkError);

impl From<InfraError> for BrokerLinkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<BrokerLinkError> for InfraError {
    fn from(value: BrokerLinkError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoBrokerLinkError {
    fn into_brokerlink(self) -> BrokerLinkError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → BrokerLinkError */
/* -------------------------------------------------------------------------- */

/// Render an error with its whole `source()` chain.
///
/// reqwest's own `Display` stops at "error sending request"; the hyper and
/// io causes underneath carry the words the transient vocabulary matches.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

impl IntoBrokerLinkError for HttpError {
    fn into_brokerlink(self) -> BrokerLinkError {
        let detail = error_chain(&self);

        if self.is_timeout() {
            return BrokerLinkError::TransientConnection(format!("HTTP request timed out: {detail}"));
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return BrokerLinkError::TransientConnection(format!("HTTP connection failure: {detail}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => BrokerLinkError::Auth { status: code, message },
                _ => BrokerLinkError::Http { status: code, body_preview: message },
            };
        }

        if VocabularyClassifier::new().matches(&detail) {
            BrokerLinkError::TransientConnection(detail)
        } else {
            BrokerLinkError::Network(detail)
        }
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_brokerlink())
    }
}

/* -------------------------------------------------------------------------- */
/* jsonwebtoken::Error → BrokerLinkError */
/* -------------------------------------------------------------------------- */

impl IntoBrokerLinkError for JwtError {
    fn into_brokerlink(self) -> BrokerLinkError {
        use jsonwebtoken::errors::ErrorKind;

        match self.kind() {
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                BrokerLinkError::Signing(format!("private key rejected: {self}"))
            }
            _ => BrokerLinkError::Signing(self.to_string()),
        }
    }
}

impl From<JwtError> for InfraError {
    fn from(value: JwtError) -> Self {
        InfraError(value.into_brokerlink())
    }
}

/* -------------------------------------------------------------------------- */
/* SupervisorError<BrokerLinkError> → BrokerLinkError */
/* -------------------------------------------------------------------------- */

impl From<SupervisorError<BrokerLinkError>> for InfraError {
    fn from(value: SupervisorError<BrokerLinkError>) -> Self {
        match value {
            SupervisorError::Operation(err) => InfraError(err),
            SupervisorError::Cancelled => InfraError(BrokerLinkError::Cancelled),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → BrokerLinkError */
/* -------------------------------------------------------------------------- */

/// Map a keychain failure for `secret_id` to `SecretUnavailable`.
///
/// The keychain error alone does not say which secret was requested, so this
/// is a function rather than a `From` impl.
pub fn keyring_unavailable(secret_id: &str, err: KeyringError) -> BrokerLinkError {
    use KeyringError::*;

    let reason = match err {
        NoEntry => "keychain entry not found".to_string(),
        BadEncoding(_) => "credential in keychain is not valid UTF-8".to_string(),
        TooLong(name, limit) => {
            format!("keychain attribute '{name}' exceeds platform limit ({limit})")
        }
        Invalid(attr, reason) => format!("keychain attribute '{attr}' is invalid: {reason}"),
        Ambiguous(entries) => {
            format!("multiple keychain entries matched request ({} results)", entries.len())
        }
        PlatformFailure(err) => format!("keychain platform error: {err}"),
        NoStorageAccess(err) => format!("unable to access secure storage: {err}"),
        other => other.to_string(),
    };

    BrokerLinkError::SecretUnavailable { secret_id: secret_id.to_string(), reason }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
