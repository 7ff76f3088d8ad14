//! Browser front-end: one HTML page with two upload controls.
//!
//! `GET /` renders the form; `POST /` takes a `multipart/form-data` body with
//! `ingredients` and `nutrition` file fields, runs the analysis, and renders
//! the summary under "Generated Summary:". Failures render the error's own
//! message with a matching status code instead of a generic 500.

use crate::analyze::LabelAnalyzer;
use crate::error::NutriError;
use crate::output::{REPORT_TITLE as TITLE, SUMMARY_HEADING};
use crate::pipeline::input::UploadedImage;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Largest accepted request body (both images together).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Multipart field names.
pub const INGREDIENTS_FIELD: &str = "ingredients";
pub const NUTRITION_FIELD: &str = "nutrition";

#[derive(Clone)]
struct WebState {
    analyzer: Arc<LabelAnalyzer>,
}

/// Build the application router.
pub fn router(analyzer: LabelAnalyzer) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/health", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(WebState {
            analyzer: Arc::new(analyzer),
        })
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, analyzer: LabelAnalyzer) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Upload page listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(analyzer)).await
}

async fn index() -> Html<String> {
    Html(render_page(None))
}

async fn submit(State(state): State<WebState>, multipart: Multipart) -> Response {
    let (ingredients, nutrition) = match read_uploads(multipart).await {
        Ok(pair) => pair,
        Err((status, message)) => {
            warn!("Rejected upload: {}", message);
            return (status, Html(render_page(Some(Outcome::Error(&message))))).into_response();
        }
    };

    match state.analyzer.analyze(&ingredients, &nutrition).await {
        Ok(report) => Html(render_page(Some(Outcome::Summary(&report.summary)))).into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!("Analysis failed: {}", e);
            } else {
                warn!("Analysis rejected input: {}", e);
            }
            (status, Html(render_page(Some(Outcome::Error(&e.to_string()))))).into_response()
        }
    }
}

/// Pull both image fields out of the form. Unknown fields are skipped.
async fn read_uploads(
    mut multipart: Multipart,
) -> Result<(UploadedImage, UploadedImage), (StatusCode, String)> {
    let mut ingredients = None;
    let mut nutrition = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid multipart data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != INGREDIENTS_FIELD && name != NUTRITION_FIELD {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read '{name}': {e}")))?;
        if data.is_empty() {
            continue;
        }

        let image = UploadedImage::from_bytes(filename, data.to_vec())
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
        if name == INGREDIENTS_FIELD {
            ingredients = Some(image);
        } else {
            nutrition = Some(image);
        }
    }

    match (ingredients, nutrition) {
        (Some(i), Some(n)) => Ok((i, n)),
        _ => Err((
            StatusCode::BAD_REQUEST,
            "Please upload both the ingredients image and the nutrition table image.".to_string(),
        )),
    }
}

/// HTTP status for a failed analysis.
pub fn status_for(err: &NutriError) -> StatusCode {
    match err {
        e if e.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
        NutriError::AnalysisFailed { .. } | NutriError::MalformedTable { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        NutriError::AnalysisTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        NutriError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        NutriError::AuthError { .. }
        | NutriError::AnalysisRequestFailed { .. }
        | NutriError::MissingOperationLocation
        | NutriError::ChatApiError { .. }
        | NutriError::EmptyCompletion
        | NutriError::MalformedResponse { .. }
        | NutriError::Transport { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

enum Outcome<'a> {
    Summary(&'a str),
    Error(&'a str),
}

fn render_page(outcome: Option<Outcome<'_>>) -> String {
    let result = match outcome {
        None => String::new(),
        Some(Outcome::Summary(text)) => format!(
            "<h2>{SUMMARY_HEADING}</h2>\n<div class=\"summary\">{}</div>",
            escape_html(text)
        ),
        Some(Outcome::Error(msg)) => {
            format!("<div class=\"error\">{}</div>", escape_html(msg))
        }
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{TITLE}</title>
<style>
body {{ font-family: sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; }}
label {{ display: block; margin: 1rem 0 0.25rem; font-weight: bold; }}
.summary {{ white-space: pre-wrap; line-height: 1.5; }}
.error {{ white-space: pre-wrap; color: #a40000; border: 1px solid #a40000; padding: 0.75rem; }}
#spinner {{ display: none; margin-top: 1rem; }}
</style>
</head>
<body>
<h1>{TITLE}</h1>
<form method="post" enctype="multipart/form-data" onsubmit="document.getElementById('spinner').style.display='block'">
<label for="{INGREDIENTS_FIELD}">Upload Ingredients Image</label>
<input type="file" id="{INGREDIENTS_FIELD}" name="{INGREDIENTS_FIELD}" accept=".jpg,.jpeg,.png" required>
<label for="{NUTRITION_FIELD}">Upload Nutrition Table Image</label>
<input type="file" id="{NUTRITION_FIELD}" name="{NUTRITION_FIELD}" accept=".jpg,.jpeg,.png" required>
<p><button type="submit">Analyze</button></p>
</form>
<p id="spinner">Analyzing images…</p>
{result}
</body>
</html>
"#
    )
}

/// Minimal HTML escaping for text nodes and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
