//! Narrative generation: build the chat exchange and call the model.
//!
//! This module turns the combined label content into a two-message exchange
//! (persona + content) and sends it through a [`ChatCompletion`] backend. It
//! is intentionally thin: all prompt wording lives in [`crate::prompts`].
//!
//! Two backends ship with the crate:
//!
//! * [`AzureChatClient`] — the Azure OpenAI deployment REST API. Default.
//! * [`ProviderChat`] — any [`edgequake_llm::LLMProvider`], for running the
//!   narrative through OpenAI, Anthropic, Gemini, Ollama and friends.
//!
//! There is no retry here. A failed completion fails the analysis.

use crate::config::{AnalysisConfig, ChatService};
use crate::error::{NutriError, Service};
use crate::pipeline::http;
use crate::prompts::{label_request, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Who said a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// The ordered messages sent for one summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub messages: Vec<ChatTurn>,
}

impl ChatExchange {
    /// Persona first, then the user message embedding `combined_content`.
    pub fn for_label(system_prompt: &str, combined_content: &str) -> Self {
        Self {
            messages: vec![
                ChatTurn {
                    role: ChatRole::System,
                    content: system_prompt.to_string(),
                },
                ChatTurn {
                    role: ChatRole::User,
                    content: label_request(combined_content),
                },
            ],
        }
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// What came back from the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Run `exchange` and return the first generated reply.
    async fn complete(
        &self,
        exchange: &ChatExchange,
        options: &SamplingOptions,
    ) -> Result<ChatReply, NutriError>;
}

/// Produce the nutrition summary for `combined_content`.
pub async fn generate_summary(
    chat: &dyn ChatCompletion,
    combined_content: &str,
    config: &AnalysisConfig,
) -> Result<ChatReply, NutriError> {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let exchange = ChatExchange::for_label(system_prompt, combined_content);
    let options = sampling_options(config);

    let reply = chat.complete(&exchange, &options).await?;
    if reply.content.trim().is_empty() {
        return Err(NutriError::EmptyCompletion);
    }

    debug!(
        "Summary: {} input tokens, {} output tokens, {:?}",
        reply.prompt_tokens,
        reply.completion_tokens,
        start.elapsed()
    );
    Ok(reply)
}

/// Build `SamplingOptions` from the analysis config.
fn sampling_options(config: &AnalysisConfig) -> SamplingOptions {
    SamplingOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

// ── Azure OpenAI ─────────────────────────────────────────────────────────

/// REST client for an Azure OpenAI chat deployment.
#[derive(Debug, Clone)]
pub struct AzureChatClient {
    http: Client,
    service: ChatService,
    api_version: String,
}

impl AzureChatClient {
    pub fn new(service: ChatService, config: &AnalysisConfig) -> Result<Self, NutriError> {
        let http = http::build_client(Service::ChatCompletion, config.request_timeout_secs)?;
        debug!(
            endpoint = %service.endpoint(),
            deployment = %service.deployment(),
            "Chat completion client initialized"
        );
        Ok(Self {
            http,
            service,
            api_version: config.chat_api_version.clone(),
        })
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=…`
    pub fn completions_url(&self) -> Result<Url, NutriError> {
        let mut url = self
            .service
            .endpoint()
            .join(&format!(
                "openai/deployments/{}/chat/completions",
                self.service.deployment()
            ))
            .map_err(|e| NutriError::InvalidConfig(format!("Failed to construct chat URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatTurn],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[async_trait]
impl ChatCompletion for AzureChatClient {
    async fn complete(
        &self,
        exchange: &ChatExchange,
        options: &SamplingOptions,
    ) -> Result<ChatReply, NutriError> {
        let url = self.completions_url()?;
        let request = CompletionRequest {
            messages: &exchange.messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        info!(
            "Requesting summary from deployment '{}' (temperature {}, max {} tokens)",
            self.service.deployment(),
            options.temperature,
            options.max_tokens
        );

        let response = self
            .http
            .post(url)
            .header("api-key", self.service.key())
            .json(&request)
            .send()
            .await
            .map_err(|e| NutriError::transport(Service::ChatCompletion, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| NutriError::transport(Service::ChatCompletion, e))?;
        if !status.is_success() {
            return Err(http::status_error(Service::ChatCompletion, status, &headers, &body));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| NutriError::MalformedResponse {
                service: Service::ChatCompletion,
                detail: format!("undecodable completion: {e}"),
            })?;
        parsed.into_reply()
    }
}

impl CompletionResponse {
    fn into_reply(self) -> Result<ChatReply, NutriError> {
        let usage = self.usage.unwrap_or_default();
        let first = self
            .choices
            .into_iter()
            .next()
            .ok_or(NutriError::EmptyCompletion)?;

        if first.finish_reason.as_deref() == Some("content_filter") {
            return Err(NutriError::ChatApiError {
                message: "response was blocked by the content filter".to_string(),
            });
        }
        if first.finish_reason.as_deref() == Some("length") {
            warn!("Summary hit the max_tokens ceiling and may be truncated");
        }

        let content = first
            .message
            .and_then(|m| m.content)
            .ok_or(NutriError::EmptyCompletion)?;

        Ok(ChatReply {
            content,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Chat backend over any edgequake-llm provider.
#[derive(Clone)]
pub struct ProviderChat {
    provider: Arc<dyn LLMProvider>,
}

impl std::fmt::Debug for ProviderChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChat")
            .field("provider", &"<dyn LLMProvider>")
            .finish()
    }
}

impl ProviderChat {
    /// Wrap an already-configured provider.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Create a named provider (e.g. `"openai"`, `"anthropic"`) for `model`.
    ///
    /// The provider reads its own API key from the environment
    /// (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, NutriError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            NutriError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider))
    }
}

#[async_trait]
impl ChatCompletion for ProviderChat {
    async fn complete(
        &self,
        exchange: &ChatExchange,
        options: &SamplingOptions,
    ) -> Result<ChatReply, NutriError> {
        let messages: Vec<ChatMessage> = exchange
            .messages
            .iter()
            .map(|turn| match turn.role {
                ChatRole::System => ChatMessage::system(turn.content.as_str()),
                ChatRole::User => ChatMessage::user(turn.content.as_str()),
            })
            .collect();

        let completion = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&completion))
            .await
            .map_err(|e| NutriError::ChatApiError {
                message: format!("{e}"),
            })?;

        Ok(ChatReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}
