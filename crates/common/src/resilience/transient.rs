//! Transient connection-error vocabulary
//!
//! Remote client libraries report severed or expired connections with a
//! variety of error types but consistent wording. Classification is a
//! case-insensitive substring match of the rendered error against a fixed
//! list of phrases.

use std::fmt;

/// Phrases that mark an error as a transient connection failure.
pub const DEFAULT_TRANSIENT_MARKERS: &[&str] = &[
    "broken pipe",
    "connection reset",
    "reset by peer",
    "connection aborted",
    "aborted",
    "connection closed",
    "timed out",
    "timeout",
    "tls",
    "ssl",
    "unexpected eof",
];

/// Substring classifier over an error's `Display` output.
#[derive(Debug, Clone)]
pub struct VocabularyClassifier {
    markers: Vec<String>,
}

impl VocabularyClassifier {
    /// Classifier using [`DEFAULT_TRANSIENT_MARKERS`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_TRANSIENT_MARKERS.iter().copied())
    }

    /// Classifier using a custom phrase list.
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { markers: markers.into_iter().map(|m| m.as_ref().to_lowercase()).collect() }
    }

    /// Whether `message` contains any marker.
    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.markers.iter().any(|marker| message.contains(marker.as_str()))
    }

    /// Whether the rendered error contains any marker.
    pub fn is_transient<E: fmt::Display + ?Sized>(&self, error: &E) -> bool {
        self.matches(&error.to_string())
    }

    #[must_use]
    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl Default for VocabularyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_default_marker_matches() {
        let classifier = VocabularyClassifier::new();
        for marker in DEFAULT_TRANSIENT_MARKERS {
            assert!(classifier.matches(&format!("io error: {marker} while reading")), "{marker}");
        }
    }

    #[test]
    fn matching_ignores_case() {
        let classifier = VocabularyClassifier::new();
        assert!(classifier.matches("Connection Reset by peer"));
        assert!(classifier.matches("TLS handshake eof"));
        assert!(classifier.matches("operation Timed Out"));
    }

    #[test]
    fn business_errors_are_not_transient() {
        let classifier = VocabularyClassifier::new();
        assert!(!classifier.matches("HTTP 400: invalid account id"));
        assert!(!classifier.matches("permission denied"));
    }

    #[test]
    fn custom_markers_replace_defaults() {
        let classifier = VocabularyClassifier::with_markers(["Session Expired"]);
        assert!(classifier.matches("remote says: session expired"));
        assert!(!classifier.matches("broken pipe"));
    }

    #[test]
    fn classifies_display_of_errors() {
        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "Broken pipe (os error 32)");
        assert!(VocabularyClassifier::new().is_transient(&err));
    }
}
