//! The single-page translation form.
//!
//! [`TranslationForm`] holds one interaction's state: the text extracted
//! from an upload, the pasted text, the language selector and the last
//! notices. It is the error boundary of the crate. Every failure becomes a
//! [`Notice`] and nothing is propagated to the caller.
//!
//! ```text
//! upload ─┐
//!         ├─▶ source text ─┐
//! paste ──┘                ├─▶ submit ─▶ translate ─▶ Markdown
//! language selector ───────┘
//! ```
//!
//! A successful upload supplies the source text. A failed one leaves the
//! source empty and the form falls back to the pasted text.

use crate::config::TranslatorConfig;
use crate::error::{TranslateError, ValidationError};
use crate::languages::LanguageSelector;
use crate::pipeline::extract::{BuiltinExtractor, DocumentExtractor};
use crate::translate::{self, TranslationRequest, TranslationResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Message shown after a successful upload.
pub const UPLOAD_SUCCESS_MESSAGE: &str = "File converted successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// An inline status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == NoticeKind::Error
    }
}

/// Turn a pipeline error into the message the user sees.
///
/// Validation failures are shown as-is. Extraction failures are prefixed
/// like an upload error, and everything else like a request error.
pub fn notice_for(error: &TranslateError) -> Notice {
    match error {
        TranslateError::Validation(e) => Notice::error(e.to_string()),
        TranslateError::Extraction(e) => Notice::error(format!("Error converting file: {e}")),
        other => Notice::error(format!("An error occurred: {other}")),
    }
}

/// Result of pressing Translate.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The translation succeeded.
    Translated(TranslationResult),
    /// Validation failed; no request was sent.
    Rejected(ValidationError),
    /// The request was sent and failed.
    Failed,
}

/// Per-interaction form state.
pub struct TranslationForm {
    config: TranslatorConfig,
    extractor: Arc<dyn DocumentExtractor>,
    selector: LanguageSelector,
    uploaded_text: Option<String>,
    pasted_text: String,
    notices: Vec<Notice>,
}

impl TranslationForm {
    /// New form with the [`BuiltinExtractor`].
    pub fn new(config: TranslatorConfig, selector: LanguageSelector) -> Self {
        Self::with_extractor(config, selector, Arc::new(BuiltinExtractor))
    }

    pub fn with_extractor(
        config: TranslatorConfig,
        selector: LanguageSelector,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        Self {
            config,
            extractor,
            selector,
            uploaded_text: None,
            pasted_text: String::new(),
            notices: Vec::new(),
        }
    }

    pub fn selector(&self) -> &LanguageSelector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut LanguageSelector {
        &mut self.selector
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Text the next submission will translate.
    pub fn source_text(&self) -> &str {
        match self.uploaded_text {
            Some(ref text) => text,
            None => &self.pasted_text,
        }
    }

    /// Whether the current source came from an upload.
    pub fn has_upload(&self) -> bool {
        self.uploaded_text.is_some()
    }

    pub fn set_pasted_text(&mut self, text: impl Into<String>) {
        self.pasted_text = text.into();
    }

    /// Forget the uploaded document; the pasted text becomes the source.
    pub fn clear_upload(&mut self) {
        self.uploaded_text = None;
    }

    /// Convert an uploaded file into the source text.
    ///
    /// On failure the previous upload is discarded, an error notice is
    /// recorded, and the pasted text stays usable.
    pub async fn upload(&mut self, bytes: Vec<u8>, filename: &str) -> &Notice {
        self.notices.clear();
        self.uploaded_text = None;

        let extracted =
            translate::extract_document(Arc::clone(&self.extractor), bytes, filename, &self.config)
                .await;
        let notice = match extracted {
            Ok(text) => {
                debug!("Upload '{}' supplied {} chars", filename, text.chars().count());
                self.uploaded_text = Some(text);
                Notice::success(UPLOAD_SUCCESS_MESSAGE)
            }
            Err(e) => notice_for(&TranslateError::Extraction(e)),
        };
        self.push(notice)
    }

    /// Validate, resolve the language and translate.
    ///
    /// Blank source text or a blank language records a validation notice
    /// without any request. A resolved language is remembered even if the
    /// request then fails.
    pub async fn submit(&mut self) -> SubmitOutcome {
        self.notices.clear();

        let source = self.source_text().to_string();
        if source.trim().is_empty() {
            return self.reject(ValidationError::EmptySourceText);
        }
        let language = match self.selector.resolve_and_remember() {
            Ok(l) => l,
            Err(e) => return self.reject(e),
        };
        let request = match TranslationRequest::new(source, &language, self.config.model.as_str()) {
            Ok(r) => r,
            Err(e) => return self.reject(e),
        };

        let translated = translate::run_request(&request, &self.config).await;
        match translated {
            Ok(result) => SubmitOutcome::Translated(result),
            Err(e) => {
                self.push(notice_for(&e));
                SubmitOutcome::Failed
            }
        }
    }

    fn reject(&mut self, error: ValidationError) -> SubmitOutcome {
        self.push(Notice::error(error.to_string()));
        SubmitOutcome::Rejected(error)
    }

    fn push(&mut self, notice: Notice) -> &Notice {
        self.notices.push(notice);
        &self.notices[self.notices.len() - 1]
    }
}
