//! Error types for the nutrilens library.
//!
//! A single fatal error type, [`NutriError`], covers every stage of the
//! pipeline. There is no partial-success mode: a label analysis either
//! produces a full [`crate::output::LabelReport`] or fails with one of these
//! variants, and scratch files are released either way.
//!
//! Variants are grouped by the stage that raises them so a caller matching on
//! the error can tell "fix your input" apart from "the remote service is
//! unhappy" without parsing messages.

use std::path::PathBuf;
use thiserror::Error;

/// Which remote service produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Azure AI Document Intelligence (layout analysis).
    DocumentAnalysis,
    /// Chat-completion endpoint (Azure OpenAI or an edgequake-llm provider).
    ChatCompletion,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::DocumentAnalysis => f.write_str("document analysis"),
            Service::ChatCompletion => f.write_str("chat completion"),
        }
    }
}

/// All fatal errors returned by the nutrilens library.
#[derive(Debug, Error)]
pub enum NutriError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The file name does not carry one of the accepted image extensions.
    #[error("Unsupported image '{filename}': expected a .jpg, .jpeg or .png file")]
    UnsupportedImage { filename: String },

    /// The payload is not a JPEG or PNG, whatever its name says.
    #[error("'{filename}' is not a JPEG or PNG image\nFirst bytes: {magic:?}")]
    NotAnImage { filename: String, magic: Vec<u8> },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Scratch storage ───────────────────────────────────────────────────
    /// Could not create, write or read back a scratch file.
    #[error("Scratch storage failed for '{path}': {source}")]
    ScratchIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Document analysis errors ──────────────────────────────────────────
    /// The analysis service rejected the submit or poll request.
    #[error("Document analysis request failed (HTTP {status}): {detail}")]
    AnalysisRequestFailed { status: u16, detail: String },

    /// The submit request was accepted but no `Operation-Location` came back.
    #[error("Document analysis accepted the job but returned no Operation-Location header")]
    MissingOperationLocation,

    /// The analysis job finished with status `failed`.
    #[error("Document analysis job failed: [{code}] {message}")]
    AnalysisFailed { code: String, message: String },

    /// The analysis job was still pending when the poll timeout elapsed.
    #[error("Document analysis did not finish within {secs}s\nIncrease --poll-timeout.")]
    AnalysisTimeout { secs: u64 },

    /// A table cell points outside the table's declared dimensions.
    #[error(
        "Table #{table} is malformed: cell ({row}, {column}) is outside its {rows}×{columns} grid"
    )]
    MalformedTable {
        table: usize,
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },

    // ── Generation errors ─────────────────────────────────────────────────
    /// The chat API returned a non-success response.
    #[error("Chat completion API error: {message}")]
    ChatApiError { message: String },

    /// The chat API answered without any generated text.
    #[error("Chat completion returned no content")]
    EmptyCompletion,

    /// The named edgequake-llm provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Shared remote errors ──────────────────────────────────────────────
    /// HTTP 401/403 from either service; retrying will not help.
    #[error("Authentication error from {service}: {detail}\nCheck the endpoint and key.")]
    AuthError { service: Service, detail: String },

    /// HTTP 429 from either service.
    #[error("Rate limit exceeded for {service}")]
    RateLimitExceeded {
        service: Service,
        retry_after_secs: Option<u64>,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("Malformed response from {service}: {detail}")]
    MalformedResponse { service: Service, detail: String },

    /// Transport-level failure (DNS, TLS, connection reset, client timeout).
    #[error("HTTP request to {service} failed: {detail}")]
    Transport { service: Service, detail: String },

    // ── Config / output errors ────────────────────────────────────────────
    /// Builder or endpoint validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NutriError {
    /// Map a reqwest transport error, keeping the service that raised it.
    pub(crate) fn transport(service: Service, err: reqwest::Error) -> Self {
        NutriError::Transport {
            service,
            detail: err.to_string(),
        }
    }

    /// Whether the error came from user-supplied input rather than from a
    /// remote service or the environment. The web front-end maps these to 4xx.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            NutriError::FileNotFound { .. }
                | NutriError::PermissionDenied { .. }
                | NutriError::InvalidInput { .. }
                | NutriError::UnsupportedImage { .. }
                | NutriError::NotAnImage { .. }
                | NutriError::DownloadFailed { .. }
                | NutriError::DownloadTimeout { .. }
        )
    }
}
