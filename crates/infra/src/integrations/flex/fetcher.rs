use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use brokerlink_common::resilience::ConnectionSupervisor;
use brokerlink_core::{SecretFetcher, TabularEnvelopeParser};
use brokerlink_domain::constants::{
    ERROR_CODE_MARKER, FAIL_STATUS_MARKER, HTML_DOCTYPE_PREFIX, HTML_PAGE_PREFIX,
};
use brokerlink_domain::{
    body_preview, BrokerLinkConfig, BrokerLinkError, ReportConfig, ReportJob, Result, TabularTable,
};
use reqwest::{Method, StatusCode};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::template::TemplateResponse;
use crate::errors::InfraError;
use crate::http::{read_bytes, supervised_http, HttpClient};

/// Outcome of inspecting one phase response.
enum Payload {
    Ready(Vec<u8>),
    /// Non-200 or an error marker in a 200 body; worth another attempt.
    Pending(String),
}

/// Client for the two-phase Flex report protocol.
///
/// Phase 1 (`SendRequest`) asks the service to generate a statement and
/// returns a reference code plus the URL to collect it from. Phase 2
/// (`GetStatement`) polls that URL until the statement is ready. The service
/// answers HTTP 200 for most failures, so every body is inspected for error
/// markers; a status code alone never counts as success.
///
/// Each phase has its own budget of `max_attempts` payload checks with a
/// fixed delay between them. Transport failures inside an attempt are
/// retried separately by the HTTP handle's supervisor.
pub struct ReportFetcher {
    http: ConnectionSupervisor<HttpClient, BrokerLinkError>,
    template_url: String,
    version: u32,
    max_attempts: u32,
    retry_delay: Duration,
    secrets: Arc<dyn SecretFetcher>,
    service_token_secret_id: String,
    service_token: OnceCell<String>,
    parser: TabularEnvelopeParser,
}

impl fmt::Debug for ReportFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportFetcher")
            .field("template_url", &self.template_url)
            .field("version", &self.version)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("service_token_secret_id", &self.service_token_secret_id)
            .finish_non_exhaustive()
    }
}

impl ReportFetcher {
    pub fn new(
        http: ConnectionSupervisor<HttpClient, BrokerLinkError>,
        report: &ReportConfig,
        secrets: Arc<dyn SecretFetcher>,
    ) -> Self {
        Self {
            http,
            template_url: report.template_url.clone(),
            version: report.version,
            max_attempts: report.max_attempts.max(1),
            retry_delay: report.retry_delay(),
            secrets,
            service_token_secret_id: report.service_token_secret_id.clone(),
            service_token: OnceCell::new(),
            parser: TabularEnvelopeParser::default(),
        }
    }

    /// Fetcher with its own supervised HTTP handle built from `config`.
    pub fn from_config(config: &BrokerLinkConfig, secrets: Arc<dyn SecretFetcher>) -> Self {
        let http = supervised_http("flex", &config.http, &config.supervisor);
        Self::new(http, &config.report, secrets)
    }

    #[must_use]
    pub fn with_parser(mut self, parser: TabularEnvelopeParser) -> Self {
        self.parser = parser;
        self
    }

    /// Fetch and parse the report for `query_id` using the configured
    /// service token.
    ///
    /// # Errors
    /// `SecretUnavailable` if the service token cannot be resolved, then as
    /// for [`fetch_report_with_token`](Self::fetch_report_with_token).
    pub async fn fetch_report(&self, query_id: &str) -> Result<TabularTable> {
        let token = self.service_token().await?;
        self.run(token, query_id, &CancellationToken::new()).await
    }

    /// Fetch and parse the report for `query_id` with an explicit token.
    ///
    /// # Errors
    /// `TemplateGenerationFailed`, `MalformedTemplate`,
    /// `ReportGenerationFailed` or `MalformedExport` naming the phase that
    /// failed; transport errors once the supervisor gives up.
    pub async fn fetch_report_with_token(
        &self,
        token: &str,
        query_id: &str,
    ) -> Result<TabularTable> {
        self.run(token, query_id, &CancellationToken::new()).await
    }

    /// Like [`fetch_report`](Self::fetch_report), stopping between attempts
    /// once `cancel` fires.
    ///
    /// # Errors
    /// `Cancelled` on cancellation, otherwise as for `fetch_report`.
    pub async fn fetch_report_cancellable(
        &self,
        query_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TabularTable> {
        let token = self.service_token().await?;
        self.run(token, query_id, cancel).await
    }

    async fn service_token(&self) -> Result<&str> {
        let token = self
            .service_token
            .get_or_try_init(|| async {
                let bytes = self.secrets.get_secret(&self.service_token_secret_id).await?;
                let token =
                    String::from_utf8(bytes).map_err(|_| BrokerLinkError::SecretUnavailable {
                        secret_id: self.service_token_secret_id.clone(),
                        reason: "service token is not valid UTF-8".into(),
                    })?;
                debug!(secret_id = %self.service_token_secret_id, "flex service token resolved");
                Ok::<_, BrokerLinkError>(token.trim().to_string())
            })
            .await?;
        Ok(token.as_str())
    }

    #[instrument(skip(self, token, cancel), fields(job_id))]
    async fn run(
        &self,
        token: &str,
        query_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TabularTable> {
        if query_id.trim().is_empty() {
            return Err(BrokerLinkError::InvalidInput("query id must not be empty".into()));
        }

        let mut job = ReportJob::new(query_id);
        tracing::Span::current().record("job_id", tracing::field::display(job.job_id()));

        match self.drive(&mut job, token, cancel).await {
            Ok(table) => {
                info!(
                    query_id,
                    rows = table.len(),
                    columns = table.header().len(),
                    phases = job.history().len(),
                    "report fetched"
                );
                Ok(table)
            }
            Err(err) => {
                let failed_in = job.fail(err.to_string());
                warn!(query_id, phase = %failed_in, error = %err, "report fetch failed");
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        job: &mut ReportJob,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<TabularTable> {
        job.request_template()?;
        let template = self.request_template(job.query_id(), token, cancel).await?;
        job.template_ready(
            template.reference_code().unwrap_or_default(),
            template.url().unwrap_or_default(),
        )?;
        debug!(reference_code = job.reference_code().unwrap_or_default(), "report template ready");

        let (report_url, reference_code) = job.request_report()?;
        let raw = self.request_report(&report_url, &reference_code, token, cancel).await?;
        job.report_ready()?;

        let table = self.parser.parse(&raw)?;
        job.parsed()?;
        Ok(table)
    }

    /// Phase 1: obtain a reference code and the report URL.
    async fn request_template(
        &self,
        query_id: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<TemplateResponse> {
        let version = self.version.to_string();
        let query = [("t", token), ("q", query_id), ("v", version.as_str())];
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            match self.poll(&self.template_url, &query, cancel).await? {
                Payload::Ready(body) => {
                    debug!(attempt, "template response received");
                    return TemplateResponse::parse(&String::from_utf8_lossy(&body));
                }
                Payload::Pending(detail) => {
                    warn!(attempt, max_attempts = self.max_attempts, %detail, "template not ready");
                    last = detail;
                }
            }
            if attempt < self.max_attempts {
                self.pause(cancel).await?;
            }
        }

        Err(BrokerLinkError::TemplateGenerationFailed { attempts: self.max_attempts, detail: last })
    }

    /// Phase 2: collect the generated statement.
    async fn request_report(
        &self,
        report_url: &str,
        reference_code: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let version = self.version.to_string();
        let query = [("t", token), ("q", reference_code), ("v", version.as_str())];
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            match self.poll(report_url, &query, cancel).await? {
                Payload::Ready(body) if is_html_page(&body) => {
                    return Err(BrokerLinkError::ReportGenerationFailed {
                        attempts: attempt,
                        detail: format!(
                            "HTML error page: {}",
                            body_preview(&String::from_utf8_lossy(&body))
                        ),
                    });
                }
                Payload::Ready(body) => {
                    debug!(attempt, bytes = body.len(), "report payload received");
                    return Ok(body);
                }
                Payload::Pending(detail) => {
                    warn!(attempt, max_attempts = self.max_attempts, %detail, "report not ready");
                    last = detail;
                }
            }
            if attempt < self.max_attempts {
                self.pause(cancel).await?;
            }
        }

        Err(BrokerLinkError::ReportGenerationFailed { attempts: self.max_attempts, detail: last })
    }

    /// One supervised GET, classified by status and error markers.
    async fn poll(
        &self,
        url: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Payload> {
        let (status, body) = self
            .http
            .execute_cancellable(cancel, |client| {
                let request = client.request(Method::GET, url).query(query);
                async move {
                    let response = client.send(request).await?;
                    let status = response.status();
                    Ok::<_, BrokerLinkError>((status, read_bytes(response).await?))
                }
            })
            .await
            .map_err(|err| BrokerLinkError::from(InfraError::from(err)))?;

        Ok(classify(status, body))
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(BrokerLinkError::Cancelled),
            _ = tokio::time::sleep(self.retry_delay) => Ok(()),
        }
    }
}

fn classify(status: StatusCode, body: Vec<u8>) -> Payload {
    let text = String::from_utf8_lossy(&body);
    if status != StatusCode::OK {
        return Payload::Pending(format!("HTTP {}: {}", status.as_u16(), body_preview(&text)));
    }
    if text.contains(ERROR_CODE_MARKER) || text.contains(FAIL_STATUS_MARKER) {
        return Payload::Pending(body_preview(&text));
    }
    Payload::Ready(body)
}

fn is_html_page(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim_start();
    [HTML_PAGE_PREFIX, HTML_DOCTYPE_PREFIX].iter().any(|marker| {
        trimmed.get(..marker.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(marker))
    })
}
