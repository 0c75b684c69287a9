//! Error types for the edgequake-translate library.
//!
//! Each fallible stage of the pipeline owns a small error enum:
//!
//! * [`ValidationError`]: the form was submitted with an empty source text
//!   or an empty target language. Detected before any network I/O.
//!
//! * [`ExtractionError`]: an uploaded document could not be turned into
//!   text (unsupported extension, corrupt archive, not UTF-8).
//!
//! * [`TransportError`]: the chat-completion call failed (timeout,
//!   network, authentication, rate limit, malformed response).
//!
//! [`TranslateError`] wraps all three for the top-level `translate*`
//! functions. The [`crate::form::TranslationForm`] never lets any of them
//! escape: each one becomes an inline [`crate::form::Notice`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-translate library.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Submission rejected before any request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The uploaded document could not be converted to text.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The translation request failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Submission-time validation failures. Never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please provide some text to translate.")]
    EmptySourceText,

    #[error("Please select or enter a target language.")]
    EmptyTargetLanguage,
}

/// Document conversion failures.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No extractor is registered for this extension.
    #[error("Unsupported file type '{extension}' for '{filename}'")]
    UnsupportedFormat { filename: String, extension: String },

    /// The file is structurally broken (bad zip, bad XML, missing part).
    #[error("'{filename}' is corrupt or unreadable: {detail}")]
    Corrupt { filename: String, detail: String },

    /// A text file that is not valid UTF-8.
    #[error("'{filename}' is not valid UTF-8 text (invalid byte at offset {offset})")]
    InvalidEncoding { filename: String, offset: usize },

    /// Writing or reading the scratch copy failed.
    #[error("I/O error while converting '{filename}': {source}")]
    Io {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

/// Chat-completion failures.
///
/// [`TransportError::is_transient`] decides whether the client retries.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The configured backend cannot be used (missing API key etc.).
    #[error("LLM backend '{backend}' is not configured.\n{hint}")]
    NotConfigured { backend: String, hint: String },

    /// A single attempt exceeded the configured timeout.
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// DNS, connect, TLS or mid-body failures.
    #[error("Network error: {detail}")]
    Network { detail: String },

    /// 401 / 403. Not retried.
    #[error("Authentication failed ({status}): {detail}")]
    Auth { status: u16, detail: String },

    /// 429, optionally with a `Retry-After` delay.
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success status.
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// The body did not contain `choices[0].message.content`.
    #[error("Malformed response: {detail}")]
    MalformedResponse { detail: String },

    /// Error reported by an `edgequake_llm` provider.
    #[error("LLM API error: {message}")]
    Provider { message: String },
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout { .. }
            | TransportError::Network { .. }
            | TransportError::RateLimited { .. } => true,
            TransportError::Http { status, .. } => *status >= 500,
            TransportError::NotConfigured { .. }
            | TransportError::Auth { .. }
            | TransportError::MalformedResponse { .. }
            | TransportError::Provider { .. } => false,
        }
    }
}
