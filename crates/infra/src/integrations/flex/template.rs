//! Phase-1 response body (`FlexStatementResponse`)

use brokerlink_domain::{body_preview, BrokerLinkError, Result};
use serde::Deserialize;

/// The fields of a `SendRequest` response the protocol consumes.
///
/// ```xml
/// <FlexStatementResponse timestamp="...">
///   <Status>Success</Status>
///   <ReferenceCode>1234567890</ReferenceCode>
///   <Url>https://.../GetStatement</Url>
/// </FlexStatementResponse>
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TemplateResponse {
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "ReferenceCode", default)]
    pub reference_code: Option<String>,
    #[serde(rename = "Url", default)]
    pub url: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "ErrorMessage", default)]
    pub error_message: Option<String>,
}

impl TemplateResponse {
    /// Parse a phase-1 body.
    ///
    /// # Errors
    /// `MalformedTemplate` when the body is not XML of the expected shape or
    /// lacks a non-empty `ReferenceCode` or `Url`.
    pub fn parse(body: &str) -> Result<Self> {
        let parsed: Self = quick_xml::de::from_str(body).map_err(|err| {
            BrokerLinkError::MalformedTemplate(format!("{err}: {}", body_preview(body)))
        })?;

        if parsed.reference_code().is_none() {
            return Err(BrokerLinkError::MalformedTemplate(format!(
                "missing ReferenceCode: {}",
                body_preview(body)
            )));
        }
        if parsed.url().is_none() {
            return Err(BrokerLinkError::MalformedTemplate(format!(
                "missing Url: {}",
                body_preview(body)
            )));
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn reference_code(&self) -> Option<&str> {
        non_blank(self.reference_code.as_deref())
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        non_blank(self.url.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_response() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<FlexStatementResponse timestamp="28 August, 2024 10:37 AM EDT">
<Status>Success</Status>
<ReferenceCode>ABC123</ReferenceCode>
<Url>https://flex.example/GetStatement</Url>
</FlexStatementResponse>"#;

        let parsed = TemplateResponse::parse(body).unwrap();
        assert_eq!(parsed.status.as_deref(), Some("Success"));
        assert_eq!(parsed.reference_code(), Some("ABC123"));
        assert_eq!(parsed.url(), Some("https://flex.example/GetStatement"));
    }

    #[test]
    fn trims_element_text() {
        let body = "<FlexStatementResponse><ReferenceCode>\n  R1 \n</ReferenceCode><Url> http://x/report </Url></FlexStatementResponse>";
        let parsed = TemplateResponse::parse(body).unwrap();
        assert_eq!(parsed.reference_code(), Some("R1"));
        assert_eq!(parsed.url(), Some("http://x/report"));
    }

    #[test]
    fn missing_reference_code_is_malformed() {
        let body = "<FlexStatementResponse><Status>Success</Status><Url>http://x</Url></FlexStatementResponse>";
        let err = TemplateResponse::parse(body).unwrap_err();
        assert!(matches!(err, BrokerLinkError::MalformedTemplate(msg) if msg.contains("ReferenceCode")));
    }

    #[test]
    fn non_xml_is_malformed() {
        let err = TemplateResponse::parse("Sym,Qty\nAAPL,10").unwrap_err();
        assert!(matches!(err, BrokerLinkError::MalformedTemplate(_)));
    }
}
