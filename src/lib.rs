//! # edgequake-translate
//!
//! Translate uploaded documents or pasted text into another language and
//! get clean Markdown back, using one LLM chat-completion call.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload / paste
//!  │
//!  ├─ 1. Extract   docx / pptx / xlsx / text → text (spawn_blocking, temp file)
//!  ├─ 2. Language  catalog of 21 labels or a custom entry, remembered default
//!  ├─ 3. Prompt    "Translate the following text into {language} …"
//!  ├─ 4. LLM       one request, temperature 0.3, timeout + bounded retry
//!  └─ 5. Sanitize  strip the ```markdown … ``` wrapper
//! ```
//!
//! [`TranslationForm`] ties the stages together for interactive use and
//! turns every failure into an inline [`Notice`]. The lower-level
//! [`translate`] family returns [`TranslateError`] instead.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_translate::{translate, TranslatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OPENAI_API_KEY is required; OPENAI_API_URL and OPENAI_MODEL are optional
//!     let config = TranslatorConfig::from_env()?;
//!     let result = translate("Where is the library?", "Spanish", &config).await?;
//!     println!("{}", result.sanitized_content);
//!     eprintln!("tokens: {} in / {} out", result.input_tokens, result.output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `trans2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-translate = { version = "0.1", default-features = false }
//! ```
//!
//! ## Backends
//!
//! | Selected by | Backend |
//! |-------------|---------|
//! | [`TranslatorConfigBuilder::backend`] | any [`ChatBackend`] you provide |
//! | `EDGEQUAKE_LLM_PROVIDER` / `--provider` | an `edgequake_llm` provider (anthropic, gemini, ollama, …) |
//! | default | [`OpenAiCompatibleBackend`] at `OPENAI_API_URL` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod form;
pub mod languages;
pub mod pipeline;
pub mod preferences;
pub mod progress;
pub mod prompts;
pub mod translate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{TranslatorConfig, TranslatorConfigBuilder, TRANSLATION_TEMPERATURE};
pub use error::{ExtractionError, TransportError, TranslateError, ValidationError};
pub use form::{Notice, NoticeKind, SubmitOutcome, TranslationForm};
pub use languages::{LanguageCatalog, LanguageChoice, LanguageSelector, CUSTOM_OPTION, DEFAULT_LANGUAGE};
pub use pipeline::extract::{BuiltinExtractor, DocumentExtractor};
pub use pipeline::llm::{ChatBackend, ChatCompletion, ChatRequest, OpenAiCompatibleBackend, ProviderBackend};
pub use pipeline::postprocess::sanitize_markdown;
pub use preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use progress::{NoopProgressCallback, ProgressCallback, TranslationProgressCallback};
pub use prompts::build_translation_prompt;
pub use translate::{
    translate, translate_document, translate_sync, translate_to_file, TranslationRequest,
    TranslationResult,
};
