//! Wire-level constants
//!
//! Centralized vocabulary for the brokerage's legacy formats. The report
//! protocol and the envelope parser match against these names only, so tests
//! can exercise every marker.

/// Reserved envelope markers in the flat-file export.
///
/// Beginning/end of account, file and section, end of file, and message
/// lines. A record with any field equal to one of these is a control line.
pub const ENVELOPE_MARKERS: [&str; 7] = ["BOA", "BOF", "BOS", "EOS", "EOA", "EOF", "MSG"];

/// Present in any Flex web-service response that reports a business failure,
/// even when the HTTP status is 200.
pub const ERROR_CODE_MARKER: &str = "ErrorCode";

/// Status element emitted by the statement endpoint on failure.
pub const FAIL_STATUS_MARKER: &str = "<Status>Fail</Status>";

/// Prefix of a gateway HTML error page (compared case-insensitively after
/// trimming).
pub const HTML_PAGE_PREFIX: &str = "<html";

/// Doctype line some gateways put before [`HTML_PAGE_PREFIX`].
pub const HTML_DOCTYPE_PREFIX: &str = "<!doctype html";

// Signing
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";
pub const SIGNED_BODY_CONTENT_TYPE: &str = "application/jwt";

// Error reporting
pub const BODY_PREVIEW_LIMIT: usize = 256;
