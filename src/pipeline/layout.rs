//! Layout analysis: submit an image to Document Intelligence, poll for the
//! result, and decode it into a [`RecognizedDocument`].
//!
//! ## Submit / poll
//!
//! The service is asynchronous. A `POST …/documentModels/{model}:analyze`
//! returns `202 Accepted` and an `Operation-Location` URL; the result is
//! fetched by polling that URL until its `status` is `succeeded` or `failed`.
//! The two halves are separate on purpose:
//!
//! * [`DocumentAnalyzer::begin_analysis`] submits and hands back a poller.
//! * [`AnalysisPoller::poll`] performs one status check and reports
//!   [`PollState::Pending`], [`PollState::Complete`] or [`PollState::Failed`].
//! * [`wait_for_result`] drives a poller to completion with an interval and a
//!   deadline.
//!
//! Callers that need cancellation simply stop calling `poll` (or drop the
//! future returned by `wait_for_result`).

use crate::config::{AnalysisConfig, AnalysisService};
use crate::document::{Page, RecognizedDocument, Table, TableCell};
use crate::error::{NutriError, Service};
use crate::pipeline::http::{self, ApiError};
use crate::pipeline::input::ImageKind;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Header carrying the Document Intelligence key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header carrying the poll URL on a `202 Accepted` submit response.
pub const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// Outcome of a single status poll.
#[derive(Debug)]
pub enum PollState {
    /// Job is queued or running.
    Pending,
    /// Job succeeded.
    Complete(RecognizedDocument),
    /// Job finished unsuccessfully.
    Failed(NutriError),
}

/// Submits images for layout analysis.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Submit `image` and return a poller for the job.
    async fn begin_analysis(
        &self,
        image: &[u8],
        kind: ImageKind,
    ) -> Result<Box<dyn AnalysisPoller>, NutriError>;
}

/// One in-flight analysis job.
#[async_trait]
pub trait AnalysisPoller: Send {
    /// Check the job status once.
    ///
    /// `Err` means the poll request itself failed (network, auth, bad JSON);
    /// a job that ran and failed is `Ok(PollState::Failed(_))`.
    async fn poll(&mut self) -> Result<PollState, NutriError>;

    /// Server-suggested delay before the next poll, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Poll until the job completes, fails, or `timeout` elapses.
///
/// A server `Retry-After` can lengthen the wait between polls but never
/// shorten it below `interval`. A wait that would overrun the deadline is cut
/// short so one final poll happens at the deadline.
///
/// `on_pending` is called with the 1-based attempt number each time a poll
/// comes back pending.
pub async fn wait_for_result(
    poller: &mut dyn AnalysisPoller,
    interval: Duration,
    timeout: Duration,
    mut on_pending: impl FnMut(u32) + Send,
) -> Result<RecognizedDocument, NutriError> {
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match poller.poll().await? {
            PollState::Complete(doc) => {
                debug!(
                    "Analysis complete after {} polls: {} lines, {} tables",
                    attempt,
                    doc.line_count(),
                    doc.tables.len()
                );
                return Ok(doc);
            }
            PollState::Failed(err) => return Err(err),
            PollState::Pending => {
                on_pending(attempt);
                let remaining = timeout.saturating_sub(start.elapsed());
                if remaining.is_zero() {
                    warn!("Analysis still pending after {} polls, giving up", attempt);
                    return Err(NutriError::AnalysisTimeout {
                        secs: timeout.as_secs(),
                    });
                }
                // The configured interval is a floor; a last poll lands on the deadline.
                let delay = poller
                    .retry_after()
                    .map_or(interval, |suggested| suggested.max(interval));
                tokio::time::sleep(delay.min(remaining)).await;
            }
        }
    }
}

// ── Azure Document Intelligence client ───────────────────────────────────

/// REST client for Azure AI Document Intelligence (formerly Form Recognizer).
#[derive(Debug, Clone)]
pub struct AzureLayoutClient {
    http: Client,
    service: AnalysisService,
    model_id: String,
    api_version: String,
}

impl AzureLayoutClient {
    /// Create a client for `service` using the model id, API version and
    /// request timeout from `config`.
    pub fn new(service: AnalysisService, config: &AnalysisConfig) -> Result<Self, NutriError> {
        let http = http::build_client(Service::DocumentAnalysis, config.request_timeout_secs)?;
        debug!(
            endpoint = %service.endpoint(),
            model = %config.model_id,
            "Document analysis client initialized"
        );
        Ok(Self {
            http,
            service,
            model_id: config.model_id.clone(),
            api_version: config.analysis_api_version.clone(),
        })
    }

    /// `{endpoint}/formrecognizer/documentModels/{model}:analyze?api-version=…`
    pub fn analyze_url(&self) -> Result<Url, NutriError> {
        let mut url = self
            .service
            .endpoint()
            .join(&format!(
                "formrecognizer/documentModels/{}:analyze",
                self.model_id
            ))
            .map_err(|e| NutriError::InvalidConfig(format!("Failed to construct analyze URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }
}

#[async_trait]
impl DocumentAnalyzer for AzureLayoutClient {
    async fn begin_analysis(
        &self,
        image: &[u8],
        kind: ImageKind,
    ) -> Result<Box<dyn AnalysisPoller>, NutriError> {
        let url = self.analyze_url()?;
        info!("Submitting {} byte {} for layout analysis", image.len(), kind.mime_type());

        let response = self
            .http
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, self.service.key())
            .header(CONTENT_TYPE, kind.mime_type())
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| NutriError::transport(Service::DocumentAnalysis, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(http::status_error(Service::DocumentAnalysis, status, &headers, &body));
        }

        let location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(NutriError::MissingOperationLocation)?;
        let operation_url = Url::parse(location).map_err(|e| NutriError::MalformedResponse {
            service: Service::DocumentAnalysis,
            detail: format!("invalid Operation-Location '{location}': {e}"),
        })?;
        debug!("Analysis accepted, polling {}", operation_url);

        Ok(Box::new(AzureLayoutPoller {
            http: self.http.clone(),
            operation_url,
            key: self.service.key().to_string(),
            retry_after: http::retry_after(response.headers()).map(Duration::from_secs),
        }))
    }
}

/// Poller for one Document Intelligence analyze operation.
struct AzureLayoutPoller {
    http: Client,
    operation_url: Url,
    key: String,
    retry_after: Option<Duration>,
}

#[async_trait]
impl AnalysisPoller for AzureLayoutPoller {
    async fn poll(&mut self) -> Result<PollState, NutriError> {
        let response = self
            .http
            .get(self.operation_url.clone())
            .header(SUBSCRIPTION_KEY_HEADER, &self.key)
            .send()
            .await
            .map_err(|e| NutriError::transport(Service::DocumentAnalysis, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| NutriError::transport(Service::DocumentAnalysis, e))?;

        if !status.is_success() {
            return Err(http::status_error(Service::DocumentAnalysis, status, &headers, &body));
        }
        self.retry_after = http::retry_after(&headers).map(Duration::from_secs);

        let operation: AnalyzeOperation =
            serde_json::from_str(&body).map_err(|e| NutriError::MalformedResponse {
                service: Service::DocumentAnalysis,
                detail: format!("undecodable analyze result: {e}"),
            })?;
        Ok(operation.into_poll_state())
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: OperationStatus,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<WirePage>,
    #[serde(default)]
    tables: Vec<WireTable>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePage {
    #[serde(default)]
    lines: Vec<WireLine>,
}

#[derive(Debug, Deserialize)]
struct WireLine {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTable {
    row_count: usize,
    column_count: usize,
    #[serde(default)]
    cells: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCell {
    row_index: usize,
    column_index: usize,
    #[serde(default)]
    content: String,
}

impl AnalyzeOperation {
    fn into_poll_state(self) -> PollState {
        match self.status {
            OperationStatus::NotStarted | OperationStatus::Running => PollState::Pending,
            OperationStatus::Unknown => {
                warn!("Unrecognised analysis status, treating as pending");
                PollState::Pending
            }
            OperationStatus::Succeeded => {
                let result = self.analyze_result.unwrap_or_else(|| {
                    warn!("Analysis succeeded without an analyzeResult");
                    AnalyzeResult::default()
                });
                PollState::Complete(result.into())
            }
            OperationStatus::Failed | OperationStatus::Canceled => {
                let error = self.error.unwrap_or_default();
                PollState::Failed(NutriError::AnalysisFailed {
                    code: if error.code.is_empty() {
                        format!("{:?}", self.status)
                    } else {
                        error.code
                    },
                    message: if error.message.is_empty() {
                        "no error details returned".to_string()
                    } else {
                        error.message
                    },
                })
            }
        }
    }
}

impl From<AnalyzeResult> for RecognizedDocument {
    fn from(result: AnalyzeResult) -> Self {
        RecognizedDocument {
            pages: result
                .pages
                .into_iter()
                .map(|p| Page {
                    lines: p.lines.into_iter().map(|l| l.content).collect(),
                })
                .collect(),
            tables: result
                .tables
                .into_iter()
                .map(|t| Table {
                    row_count: t.row_count,
                    column_count: t.column_count,
                    cells: t
                        .cells
                        .into_iter()
                        .map(|c| TableCell {
                            row_index: c.row_index,
                            column_index: c.column_index,
                            content: c.content,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
