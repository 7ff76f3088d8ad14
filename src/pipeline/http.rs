//! Shared HTTP plumbing for the two Azure clients.

use crate::error::{NutriError, Service};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Build the reqwest client both services use.
pub(crate) fn build_client(service: Service, timeout_secs: u64) -> Result<Client, NutriError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("nutrilens/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| NutriError::Internal(format!("Failed to build HTTP client for {service}: {e}")))
}

/// Seconds from a `Retry-After` header, when present and numeric.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Azure's common error envelope: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: ApiError,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Best human-readable detail for an error body: the envelope's message when
/// it parses, the raw body otherwise.
pub(crate) fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) if !env.error.message.is_empty() => {
            if env.error.code.is_empty() {
                env.error.message
            } else {
                format!("[{}] {}", env.error.code, env.error.message)
            }
        }
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.trim().to_string(),
    }
}

/// Map a non-success response to the matching [`NutriError`].
///
/// Auth and rate-limit statuses are shared; everything else becomes the
/// service-specific request error.
pub(crate) fn status_error(
    service: Service,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> NutriError {
    let detail = error_detail(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => NutriError::AuthError { service, detail },
        StatusCode::TOO_MANY_REQUESTS => NutriError::RateLimitExceeded {
            service,
            retry_after_secs: retry_after(headers),
        },
        _ => match service {
            Service::DocumentAnalysis => NutriError::AnalysisRequestFailed {
                status: status.as_u16(),
                detail,
            },
            Service::ChatCompletion => NutriError::ChatApiError {
                message: format!("HTTP {}: {}", status.as_u16(), detail),
            },
        },
    }
}
