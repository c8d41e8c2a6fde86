//! Two-phase report job state machine
//!
//! A [`ReportJob`] is created at the start of one fetch call and dropped at
//! the end. It enforces the protocol ordering:
//!
//! ```text
//! Idle → TemplateRequested → TemplateReady → ReportRequested → ReportReady → Parsed
//!   └──────────────┴────────────────┴───────────────┴──────────────┴──► Failed
//! ```
//!
//! Phase 2 cannot start until phase 1 has produced a non-empty reference code.

use serde::Serialize;
use uuid::Uuid;

use crate::errors::{BrokerLinkError, Result};
use crate::impl_wire_name_conversions;

/// Protocol phase of a report job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPhase {
    Idle,
    TemplateRequested,
    TemplateReady,
    ReportRequested,
    ReportReady,
    Parsed,
    Failed,
}

impl_wire_name_conversions!(ReportPhase {
    Idle => "idle",
    TemplateRequested => "template_requested",
    TemplateReady => "template_ready",
    ReportRequested => "report_requested",
    ReportReady => "report_ready",
    Parsed => "parsed",
    Failed => "failed",
});

impl ReportPhase {
    /// Terminal phases accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Parsed | Self::Failed)
    }

    const fn successor(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::TemplateRequested),
            Self::TemplateRequested => Some(Self::TemplateReady),
            Self::TemplateReady => Some(Self::ReportRequested),
            Self::ReportRequested => Some(Self::ReportReady),
            Self::ReportReady => Some(Self::Parsed),
            Self::Parsed | Self::Failed => None,
        }
    }
}

/// One in-flight report request.
#[derive(Debug, Clone, Serialize)]
pub struct ReportJob {
    job_id: Uuid,
    query_id: String,
    phase: ReportPhase,
    reference_code: Option<String>,
    report_url: Option<String>,
    failure: Option<String>,
    history: Vec<ReportPhase>,
}

impl ReportJob {
    /// Start a job for `query_id` in [`ReportPhase::Idle`].
    #[must_use]
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            query_id: query_id.into(),
            phase: ReportPhase::Idle,
            reference_code: None,
            report_url: None,
            failure: None,
            history: vec![ReportPhase::Idle],
        }
    }

    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }

    #[must_use]
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    #[must_use]
    pub const fn phase(&self) -> ReportPhase {
        self.phase
    }

    #[must_use]
    pub fn reference_code(&self) -> Option<&str> {
        self.reference_code.as_deref()
    }

    /// Statement endpoint returned by phase 1.
    #[must_use]
    pub fn report_url(&self) -> Option<&str> {
        self.report_url.as_deref()
    }

    /// Reason recorded by [`ReportJob::fail`], if the job failed.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Every phase the job has entered, in order.
    #[must_use]
    pub fn history(&self) -> &[ReportPhase] {
        &self.history
    }

    /// `Idle → TemplateRequested`.
    pub fn request_template(&mut self) -> Result<()> {
        self.advance(ReportPhase::TemplateRequested)
    }

    /// `TemplateRequested → TemplateReady`, recording the phase-1 outputs.
    ///
    /// # Errors
    /// `MalformedTemplate` if either value is blank; the job is left in
    /// its current phase so the caller can mark it failed.
    pub fn template_ready(
        &mut self,
        reference_code: impl Into<String>,
        report_url: impl Into<String>,
    ) -> Result<()> {
        let reference_code = reference_code.into();
        let report_url = report_url.into();
        if reference_code.trim().is_empty() {
            return Err(BrokerLinkError::MalformedTemplate("empty ReferenceCode".into()));
        }
        if report_url.trim().is_empty() {
            return Err(BrokerLinkError::MalformedTemplate("empty Url".into()));
        }
        self.advance(ReportPhase::TemplateReady)?;
        self.reference_code = Some(reference_code.trim().to_string());
        self.report_url = Some(report_url.trim().to_string());
        Ok(())
    }

    /// `TemplateReady → ReportRequested`.
    ///
    /// Returns the `(report_url, reference_code)` pair phase 2 must use.
    ///
    /// # Errors
    /// `Internal` if no reference code exists yet.
    pub fn request_report(&mut self) -> Result<(String, String)> {
        let (Some(url), Some(reference)) = (self.report_url.clone(), self.reference_code.clone())
        else {
            return Err(BrokerLinkError::Internal(format!(
                "report {} requested before a reference code was obtained",
                self.job_id
            )));
        };
        self.advance(ReportPhase::ReportRequested)?;
        Ok((url, reference))
    }

    /// `ReportRequested → ReportReady`.
    pub fn report_ready(&mut self) -> Result<()> {
        self.advance(ReportPhase::ReportReady)
    }

    /// `ReportReady → Parsed`.
    pub fn parsed(&mut self) -> Result<()> {
        self.advance(ReportPhase::Parsed)
    }

    /// Move to [`ReportPhase::Failed`] from any non-terminal phase.
    ///
    /// Returns the phase the job was in when it failed. Failing an already
    /// terminal job keeps the first outcome.
    pub fn fail(&mut self, reason: impl Into<String>) -> ReportPhase {
        let failed_in = self.phase;
        if !failed_in.is_terminal() {
            self.phase = ReportPhase::Failed;
            self.failure = Some(reason.into());
            self.history.push(ReportPhase::Failed);
        }
        failed_in
    }

    fn advance(&mut self, next: ReportPhase) -> Result<()> {
        if self.phase.successor() != Some(next) {
            return Err(BrokerLinkError::Internal(format!(
                "illegal report transition {} -> {next} (job {})",
                self.phase, self.job_id
            )));
        }
        self.phase = next;
        self.history.push(next);
        Ok(())
    }
}
