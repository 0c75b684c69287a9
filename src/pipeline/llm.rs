//! Chat-completion transport: one request, bounded timeout, bounded retry.
//!
//! The pipeline talks to the model through [`ChatBackend`]. Two backends
//! ship with the crate:
//!
//! * [`OpenAiCompatibleBackend`]: a plain `reqwest` POST to
//!   `{base_url}/chat/completions`. Works with OpenAI and every gateway that
//!   speaks the same wire format (Azure proxies, LiteLLM, vLLM, Ollama's
//!   `/v1`), which is why `OPENAI_API_URL` is honoured here.
//! * [`ProviderBackend`]: wraps any `edgequake_llm` provider (Anthropic,
//!   Gemini, Mistral, …) selected by name.
//!
//! ## Retry Strategy
//!
//! Only transient failures are retried: timeouts, connection errors, 5xx
//! and 429. With the defaults (2 retries, 500 ms base) the waits are
//! 500 ms → 1 s. A `Retry-After` header on a 429 lengthens the wait, capped
//! at [`MAX_RETRY_AFTER_SECS`]. Authentication errors, other 4xx and
//! malformed bodies fail immediately.

use crate::config::TranslatorConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Longest server-requested back-off we are willing to honour.
pub const MAX_RETRY_AFTER_SECS: u64 = 60;

/// A single-turn chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    /// Content of the one user-role message.
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

/// The assistant's reply plus token accounting when the backend reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Something that can answer a [`ChatRequest`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short label used in logs and error messages.
    fn name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, TransportError>;
}

/// Result of [`complete_with_retry`].
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub completion: ChatCompletion,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Send `request`, retrying transient failures per `config`.
pub async fn complete_with_retry(
    backend: &Arc<dyn ChatBackend>,
    request: &ChatRequest,
    config: &TranslatorConfig,
) -> Result<CompletionOutcome, TransportError> {
    let start = Instant::now();
    let per_attempt = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<TransportError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = retry_delay_ms(config, attempt, last_err.as_ref());
            let reason = last_err
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            warn!(
                "{}: retry {}/{} after {}ms ({})",
                backend.name(),
                attempt,
                config.max_retries,
                backoff,
                reason
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_retry(attempt, config.max_retries, &reason, backoff);
            }
            sleep(Duration::from_millis(backoff)).await;
        }

        let result = match timeout(per_attempt, backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        match result {
            Ok(completion) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "{}: {} input tokens, {} output tokens, {}ms",
                    backend.name(),
                    completion.prompt_tokens,
                    completion.completion_tokens,
                    duration_ms
                );
                return Ok(CompletionOutcome {
                    completion,
                    retries: attempt,
                    duration_ms,
                });
            }
            Err(e) if e.is_transient() => {
                warn!("{}: attempt {} failed: {}", backend.name(), attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => {
                warn!("{}: attempt {} failed permanently: {}", backend.name(), attempt + 1, e);
                return Err(e);
            }
        }
    }

    Err(last_err.unwrap_or(TransportError::Network {
        detail: "no attempt was made".into(),
    }))
}

/// Exponential back-off, stretched by a 429's `Retry-After` when present.
fn retry_delay_ms(config: &TranslatorConfig, attempt: u32, last: Option<&TransportError>) -> u64 {
    let exp = config
        .retry_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    match last {
        Some(TransportError::RateLimited {
            retry_after_secs: Some(secs),
        }) => exp.max((*secs).min(MAX_RETRY_AFTER_SECS) * 1000),
        _ => exp,
    }
}

// ── OpenAI-compatible HTTP backend ───────────────────────────────────────

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// `POST {base_url}/chat/completions` with a bearer token.
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenAiCompatibleBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TransportError::NotConfigured {
                backend: "openai-compatible".into(),
                hint: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_secs,
        })
    }

    /// Backend for `config.base_url`, requiring `config.api_key`.
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, TransportError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TransportError::NotConfigured {
                backend: "openai-compatible".into(),
                hint: "Set OPENAI_API_KEY (and optionally OPENAI_API_URL / OPENAI_MODEL).".into(),
            })?;
        Self::new(config.chat_completions_url(), api_key, config.api_timeout_secs)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            TransportError::Network {
                detail: e.to_string(),
            }
        }
    }
}

/// The API's own `error.message` when the body carries one, else a short
/// excerpt of the raw body.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });
    from_json.unwrap_or_else(|| body.trim().chars().take(200).collect())
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, TransportError> {
        let body = WireRequest {
            model: &request.model,
            messages: [WireMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        info!("POST {} (model: {})", self.endpoint, request.model);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            return Err(TransportError::RateLimited { retry_after_secs });
        }

        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TransportError::Auth {
                status: status.as_u16(),
                detail: error_detail(&text),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                detail: error_detail(&text),
            });
        }

        let parsed: WireResponse =
            serde_json::from_str(&text).map_err(|e| TransportError::MalformedResponse {
                detail: e.to_string(),
            })?;

        let (prompt_tokens, completion_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::MalformedResponse {
                detail: "response has no choices[0].message.content".into(),
            })?;

        Ok(ChatCompletion {
            content,
            prompt_tokens,
            completion_tokens,
        })
    }
}

// ── edgequake-llm provider backend ───────────────────────────────────────

/// Adapter from an `edgequake_llm` provider to [`ChatBackend`].
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Instantiate a named provider ("anthropic", "gemini", "ollama", …).
    ///
    /// The provider reads its own API key variable (`ANTHROPIC_API_KEY`, …).
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, TransportError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            TransportError::NotConfigured {
                backend: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, provider_name))
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, TransportError> {
        let messages = vec![ChatMessage::user(request.prompt.clone())];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: request.max_tokens,
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TransportError::Provider {
                message: format!("{e}"),
            })?;

        Ok(ChatCompletion {
            content: response.content,
            prompt_tokens: response.prompt_tokens as usize,
            completion_tokens: response.completion_tokens as usize,
        })
    }
}

/// Pick the backend for `config`, from most to least specific:
///
/// 1. a pre-built `config.backend`,
/// 2. a named `edgequake_llm` provider (`config.provider_name`),
/// 3. the OpenAI-compatible HTTP backend at `config.base_url`.
pub fn resolve_backend(config: &TranslatorConfig) -> Result<Arc<dyn ChatBackend>, TransportError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref name) = config.provider_name {
        debug!("Using edgequake-llm provider '{}' with model {}", name, config.model);
        return Ok(Arc::new(ProviderBackend::from_name(name, &config.model)?));
    }

    Ok(Arc::new(OpenAiCompatibleBackend::from_config(config)?))
}
