//! Translation entry points.
//!
//! [`translate`] is the whole pipeline for text that is already in memory:
//! validate, build the prompt, send one chat-completion request, sanitize
//! the reply. [`translate_document`] puts document extraction in front of
//! it; [`translate_to_file`] writes the result atomically; and
//! [`translate_sync`] drives [`translate`] from blocking code.

use crate::config::{TranslatorConfig, TRANSLATION_TEMPERATURE};
use crate::error::{ExtractionError, TranslateError, ValidationError};
use crate::pipeline::extract::{self, BuiltinExtractor, DocumentExtractor};
use crate::pipeline::llm::{self, ChatRequest};
use crate::pipeline::postprocess;
use crate::prompts;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A validated translation request.
///
/// Construction through [`TranslationRequest::new`] is the only validation
/// point: an instance always has non-blank source text and target language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationRequest {
    /// Text to translate, kept verbatim (no trimming, no truncation).
    pub source_text: String,
    /// Target language, trimmed.
    pub target_language: String,
    pub model: String,
    pub temperature: f32,
}

impl TranslationRequest {
    /// Validate the inputs of a submission.
    ///
    /// Source text is checked first, so a form with both fields empty
    /// reports the missing text.
    pub fn new(
        source_text: impl Into<String>,
        target_language: &str,
        model: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let source_text = source_text.into();
        if source_text.trim().is_empty() {
            return Err(ValidationError::EmptySourceText);
        }
        let target_language = target_language.trim();
        if target_language.is_empty() {
            return Err(ValidationError::EmptyTargetLanguage);
        }
        Ok(Self {
            source_text,
            target_language: target_language.to_string(),
            model: model.into(),
            temperature: TRANSLATION_TEMPERATURE,
        })
    }

    /// The single user-role message sent to the model.
    pub fn prompt(&self) -> String {
        prompts::build_translation_prompt(&self.source_text, &self.target_language)
    }
}

/// Output of a successful translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    /// Model reply with surrounding whitespace trimmed.
    pub raw_content: String,
    /// `raw_content` with its wrapping fence pair removed.
    pub sanitized_content: String,
    pub target_language: String,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Transient failures retried before the request succeeded.
    pub retries: u32,
    pub duration_ms: u64,
}

/// Translate `source_text` into `target_language`.
///
/// Validation happens before anything else: blank text or a blank language
/// returns [`TranslateError::Validation`] without resolving a backend or
/// touching the network. Otherwise exactly one request is issued (plus
/// retries of transient failures, see [`crate::pipeline::llm`]).
///
/// # Example
/// ```rust,no_run
/// use edgequake_translate::{translate, TranslatorConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TranslatorConfig::from_env()?;
/// let result = translate("Good morning", "French", &config).await?;
/// println!("{}", result.sanitized_content);
/// # Ok(())
/// # }
/// ```
pub async fn translate(
    source_text: &str,
    target_language: &str,
    config: &TranslatorConfig,
) -> Result<TranslationResult, TranslateError> {
    let request = TranslationRequest::new(source_text, target_language, config.model.as_str())?;
    run_request(&request, config).await
}

/// Send an already-validated request.
pub async fn run_request(
    request: &TranslationRequest,
    config: &TranslatorConfig,
) -> Result<TranslationResult, TranslateError> {
    info!(
        "Translating {} chars into {} with {}",
        request.source_text.chars().count(),
        request.target_language,
        request.model
    );

    let backend = match llm::resolve_backend(config) {
        Ok(b) => b,
        Err(e) => {
            notify_error(config, &e.to_string());
            return Err(e.into());
        }
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_request_start(&request.model, &request.target_language);
    }

    let chat = ChatRequest {
        model: request.model.clone(),
        prompt: request.prompt(),
        temperature: request.temperature,
        max_tokens: config.max_tokens,
    };

    let outcome = match llm::complete_with_retry(&backend, &chat, config).await {
        Ok(o) => o,
        Err(e) => {
            warn!("Translation failed: {}", e);
            notify_error(config, &e.to_string());
            return Err(e.into());
        }
    };

    let raw_content = outcome.completion.content.trim().to_string();
    let sanitized_content = postprocess::sanitize_markdown(&raw_content);
    debug!(
        "Reply: {} chars raw, {} chars sanitized",
        raw_content.len(),
        sanitized_content.len()
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_translation_complete(sanitized_content.len());
    }

    info!(
        "Translation complete: {} in / {} out tokens, {} retries, {}ms",
        outcome.completion.prompt_tokens,
        outcome.completion.completion_tokens,
        outcome.retries,
        outcome.duration_ms
    );

    Ok(TranslationResult {
        raw_content,
        sanitized_content,
        target_language: request.target_language.clone(),
        model: request.model.clone(),
        input_tokens: outcome.completion.prompt_tokens,
        output_tokens: outcome.completion.completion_tokens,
        retries: outcome.retries,
        duration_ms: outcome.duration_ms,
    })
}

/// Convert an uploaded document to text with `extractor`, reporting
/// progress through the config's callback.
pub async fn extract_document(
    extractor: Arc<dyn DocumentExtractor>,
    bytes: Vec<u8>,
    filename: &str,
    config: &TranslatorConfig,
) -> Result<String, ExtractionError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(filename, bytes.len());
    }

    match extract::extract_upload_blocking(extractor, bytes, filename.to_string()).await {
        Ok(text) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_extraction_complete(filename, text.len());
            }
            Ok(text)
        }
        Err(e) => {
            warn!("Extraction of '{}' failed: {}", filename, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_extraction_error(filename, &e.to_string());
            }
            Err(e)
        }
    }
}

/// Extract an uploaded document with [`BuiltinExtractor`] and translate it.
///
/// An extraction that succeeds but yields only whitespace is reported as
/// [`ValidationError::EmptySourceText`].
pub async fn translate_document(
    bytes: &[u8],
    filename: &str,
    target_language: &str,
    config: &TranslatorConfig,
) -> Result<TranslationResult, TranslateError> {
    let text = extract_document(Arc::new(BuiltinExtractor), bytes.to_vec(), filename, config).await?;
    translate(&text, target_language, config).await
}

/// Translate and write the sanitized Markdown to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn translate_to_file(
    source_text: &str,
    target_language: &str,
    output_path: impl AsRef<Path>,
    config: &TranslatorConfig,
) -> Result<TranslationResult, TranslateError> {
    let result = translate(source_text, target_language, config).await?;
    write_markdown(output_path.as_ref(), &result.sanitized_content).await?;
    Ok(result)
}

/// Atomically write `markdown` to `path`, creating parent directories.
pub async fn write_markdown(path: &Path, markdown: &str) -> Result<(), TranslateError> {
    let write_err = |source: std::io::Error| TranslateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_err)?;

    debug!("Wrote {} bytes to {}", markdown.len(), path.display());
    Ok(())
}

/// Synchronous wrapper around [`translate`].
///
/// Creates a temporary tokio runtime internally.
pub fn translate_sync(
    source_text: &str,
    target_language: &str,
    config: &TranslatorConfig,
) -> Result<TranslationResult, TranslateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TranslateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(translate(source_text, target_language, config))
}

fn notify_error(config: &TranslatorConfig, message: &str) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_translation_error(message);
    }
}
