//! Configuration types for label analysis.
//!
//! Two kinds of configuration live here:
//!
//! * [`AnalysisConfig`] — behavioural knobs (model id, API versions, sampling,
//!   timeouts, scratch location). Built via [`AnalysisConfigBuilder`] and
//!   shared by reference across a run.
//! * [`AnalysisService`] / [`ChatService`] — where the remote services live
//!   and how to authenticate. These are handed to the client constructors in
//!   [`crate::pipeline`]; nothing in the library reads the environment.

use crate::error::NutriError;
use crate::progress::ProgressCallback;
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;

/// Layout model used for both images.
pub const DEFAULT_MODEL_ID: &str = "prebuilt-layout";

/// Document Intelligence REST API version for `documentModels/*:analyze`.
pub const DEFAULT_ANALYSIS_API_VERSION: &str = "2023-07-31";

/// Azure OpenAI REST API version for chat completions.
pub const DEFAULT_CHAT_API_VERSION: &str = "2024-02-15-preview";

/// Configuration for a label analysis.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use nutrilens::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .temperature(0.6)
///     .max_tokens(1200)
///     .poll_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Document Intelligence model identifier. Default: `prebuilt-layout`.
    pub model_id: String,

    /// Document Intelligence API version. Default: `2023-07-31`.
    pub analysis_api_version: String,

    /// Azure OpenAI API version. Default: `2024-02-15-preview`.
    pub chat_api_version: String,

    /// Sampling temperature for the narrative. Default: 0.6.
    ///
    /// The persona is meant to be playful, so this sits well above the
    /// near-zero values used for extraction tasks.
    pub temperature: f32,

    /// Maximum tokens the model may generate for the summary. Default: 1200.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses the built-in nutritionist persona.
    pub system_prompt: Option<String>,

    /// Delay between analysis status polls in milliseconds. Default: 1000.
    ///
    /// A longer `Retry-After` on the poll response takes precedence; a shorter
    /// one is ignored.
    pub poll_interval_ms: u64,

    /// Give up on an analysis job after this many seconds. Default: 120.
    pub poll_timeout_secs: u64,

    /// Per-HTTP-request timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Parent directory for per-request scratch directories.
    /// If None, uses the system temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// Optional stage-progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            analysis_api_version: DEFAULT_ANALYSIS_API_VERSION.to_string(),
            chat_api_version: DEFAULT_CHAT_API_VERSION.to_string(),
            temperature: 0.6,
            max_tokens: 1200,
            system_prompt: None,
            poll_interval_ms: 1000,
            poll_timeout_secs: 120,
            request_timeout_secs: 60,
            download_timeout_secs: 120,
            scratch_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model_id", &self.model_id)
            .field("analysis_api_version", &self.analysis_api_version)
            .field("chat_api_version", &self.chat_api_version)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt.as_ref().map(|_| "<custom>"))
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("scratch_dir", &self.scratch_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model_id(mut self, id: impl Into<String>) -> Self {
        self.config.model_id = id.into();
        self
    }

    pub fn analysis_api_version(mut self, v: impl Into<String>) -> Self {
        self.config.analysis_api_version = v.into();
        self
    }

    pub fn chat_api_version(mut self, v: impl Into<String>) -> Self {
        self.config.chat_api_version = v.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn poll_timeout_secs(mut self, secs: u64) -> Self {
        self.config.poll_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, NutriError> {
        let c = &self.config;
        if c.model_id.trim().is_empty() {
            return Err(NutriError::InvalidConfig("Model id must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(NutriError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.poll_interval_ms == 0 {
            return Err(NutriError::InvalidConfig(
                "Poll interval must be ≥ 1ms".into(),
            ));
        }
        if c.poll_timeout_secs == 0 || c.request_timeout_secs == 0 {
            return Err(NutriError::InvalidConfig(
                "Timeouts must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Remote services ──────────────────────────────────────────────────────

/// Where the Document Intelligence resource lives and how to reach it.
#[derive(Clone)]
pub struct AnalysisService {
    endpoint: Url,
    key: String,
}

impl AnalysisService {
    /// Validate and store the resource endpoint
    /// (e.g. `https://my-resource.cognitiveservices.azure.com/`) and key.
    pub fn new(endpoint: impl AsRef<str>, key: impl Into<String>) -> Result<Self, NutriError> {
        Ok(Self {
            endpoint: parse_endpoint("document analysis", endpoint.as_ref())?,
            key: non_empty_key("document analysis", key.into())?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisService")
            .field("endpoint", &self.endpoint.as_str())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Where the Azure OpenAI deployment lives and how to reach it.
#[derive(Clone)]
pub struct ChatService {
    endpoint: Url,
    key: String,
    deployment: String,
}

impl ChatService {
    pub fn new(
        endpoint: impl AsRef<str>,
        key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Result<Self, NutriError> {
        let deployment = deployment.into();
        if deployment.trim().is_empty() {
            return Err(NutriError::InvalidConfig(
                "chat completion deployment name must not be empty".into(),
            ));
        }
        Ok(Self {
            endpoint: parse_endpoint("chat completion", endpoint.as_ref())?,
            key: non_empty_key("chat completion", key.into())?,
            deployment,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }
}

impl fmt::Debug for ChatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatService")
            .field("endpoint", &self.endpoint.as_str())
            .field("key", &"<redacted>")
            .field("deployment", &self.deployment)
            .finish()
    }
}

/// Parse an endpoint and force a trailing slash so `Url::join` appends
/// rather than replacing the last path segment.
fn parse_endpoint(what: &str, raw: &str) -> Result<Url, NutriError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| {
        NutriError::InvalidConfig(format!("{what} endpoint '{raw}' is not a valid URL: {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(NutriError::InvalidConfig(format!(
            "{what} endpoint must be http(s), got scheme '{other}'"
        ))),
    }
}

fn non_empty_key(what: &str, key: String) -> Result<String, NutriError> {
    if key.trim().is_empty() {
        Err(NutriError::InvalidConfig(format!("{what} key must not be empty")))
    } else {
        Ok(key)
    }
}
