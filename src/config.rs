//! Configuration types for document translation.
//!
//! Everything the translation client needs (endpoint, model, credential,
//! timeout and retry policy) lives in [`TranslatorConfig`]. It is built once
//! at process start, either from the environment via
//! [`TranslatorConfig::from_env`] or with [`TranslatorConfigBuilder`], and
//! then passed by reference into every call. Nothing is read from the
//! environment after that point.

use crate::error::TranslateError;
use crate::pipeline::llm::ChatBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model: compact, cheap, good enough for faithful translation.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Sampling temperature used for every translation request.
///
/// Kept low so the model prefers a literal rendering over paraphrase.
pub const TRANSLATION_TEMPERATURE: f32 = 0.3;

/// Environment variable holding the API credential.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const ENV_BASE_URL: &str = "OPENAI_API_URL";
/// Environment variable overriding [`DEFAULT_MODEL`].
pub const ENV_MODEL: &str = "OPENAI_MODEL";
/// Environment variable selecting an `edgequake_llm` provider by name.
pub const ENV_PROVIDER: &str = "EDGEQUAKE_LLM_PROVIDER";

/// Configuration for the translation client.
///
/// # Example
/// ```rust
/// use edgequake_translate::TranslatorConfig;
///
/// let config = TranslatorConfig::builder()
///     .api_key("sk-test")
///     .model("gpt-4o-mini")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gpt-4o-mini");
/// ```
#[derive(Clone)]
pub struct TranslatorConfig {
    /// Bearer credential for the OpenAI-compatible backend. Never logged.
    pub api_key: Option<String>,

    /// API root; `/chat/completions` is appended. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Chat model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Named `edgequake_llm` provider (e.g. "anthropic", "gemini", "ollama").
    /// When set, the provider catalogue is used instead of the HTTP backend.
    pub provider_name: Option<String>,

    /// Pre-constructed backend. Takes precedence over everything else.
    pub backend: Option<Arc<dyn ChatBackend>>,

    /// Optional completion length cap. Default: None (provider default).
    pub max_tokens: Option<usize>,

    /// Retries after the first attempt, transient failures only. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Receives extraction / request lifecycle events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            backend: None,
            max_tokens: None,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ChatBackend>"))
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl TranslatorConfig {
    /// Create a new builder for `TranslatorConfig`.
    pub fn builder() -> TranslatorConfigBuilder {
        TranslatorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_API_URL`, `OPENAI_MODEL` and
    /// `EDGEQUAKE_LLM_PROVIDER` from the process environment.
    pub fn from_env() -> Result<Self, TranslateError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`TranslatorConfig::from_env`] but with an injectable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TranslateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(key) = get(ENV_API_KEY) {
            builder = builder.api_key(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        if let Some(model) = get(ENV_MODEL) {
            builder = builder.model(model);
        }
        if let Some(provider) = get(ENV_PROVIDER) {
            builder = builder.provider_name(provider);
        }
        builder.build()
    }

    /// Full URL of the chat-completions endpoint.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Builder for [`TranslatorConfig`].
#[derive(Debug)]
pub struct TranslatorConfigBuilder {
    config: TranslatorConfig,
}

impl TranslatorConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim().to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into().trim().to_string();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslatorConfig, TranslateError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(TranslateError::InvalidConfig(format!(
                "API base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.model.is_empty() {
            return Err(TranslateError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(TranslateError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
