//! End-to-end integration tests for edgequake-translate.
//!
//! Most tests drive the full pipeline against an in-process `ChatBackend`
//! or a local HTTP server speaking the chat-completions wire format, so
//! they run offline. The live tests at the bottom call a real endpoint and
//! are gated behind the `E2E_ENABLED` environment variable.
//!
//! Run the live tests with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use edgequake_translate::config::{DEFAULT_MODEL, TRANSLATION_TEMPERATURE};
use edgequake_translate::preferences::SELECTED_LANGUAGE_KEY;
use edgequake_translate::{
    sanitize_markdown, translate, translate_document, ChatBackend, ChatCompletion, ChatRequest,
    ExtractionError, FilePreferenceStore, LanguageCatalog, LanguageChoice, LanguageSelector,
    MemoryPreferenceStore, NoticeKind, PreferenceStore, SubmitOutcome, TransportError,
    TranslateError, TranslationForm, TranslatorConfig, ValidationError, CUSTOM_OPTION,
};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every request and answers with a fixed reply.
struct RecordingBackend {
    requests: Mutex<Vec<ChatRequest>>,
    reply: String,
}

impl RecordingBackend {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        })
    }

    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(ChatCompletion {
            content: self.reply.clone(),
            prompt_tokens: 40,
            completion_tokens: 25,
        })
    }
}

fn config_for(backend: &Arc<RecordingBackend>) -> TranslatorConfig {
    init_tracing();
    TranslatorConfig::builder()
        .backend(Arc::clone(backend) as Arc<dyn ChatBackend>)
        .build()
        .unwrap()
}

fn selector_with(store: &Arc<MemoryPreferenceStore>) -> LanguageSelector {
    LanguageSelector::new(
        LanguageCatalog::default(),
        Arc::clone(store) as Arc<dyn PreferenceStore>,
    )
}

fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("word/document.xml", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Serve one canned HTTP response on a local port.
///
/// Returns the API root to point the config at and a receiver yielding the
/// raw request (headers + body) the server saw.
async fn serve_once(status: &str, body: &str) -> (String, oneshot::Receiver<String>) {
    serve_once_with_headers(status, &[], body).await
}

async fn serve_once_with_headers(
    status: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (String, oneshot::Receiver<String>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let extra: String = headers
        .iter()
        .map(|(k, v)| format!("{k}: {v}\r\n"))
        .collect();
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n{body}",
        body.len()
    );
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);
            if request_complete(&raw) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
    });

    (format!("http://{addr}/v1"), rx)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(split) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..split]
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            k.eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= split + 4 + content_length
}

fn http_config(base_url: &str) -> TranslatorConfig {
    init_tracing();
    TranslatorConfig::builder()
        .api_key("sk-test-key")
        .base_url(base_url)
        .model("gpt-4o-mini")
        .max_retries(0)
        .api_timeout_secs(5)
        .build()
        .unwrap()
}

// ── Request properties ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_one_request_with_language_and_text_verbatim() {
    let backend = RecordingBackend::new("Bonjour");
    let config = config_for(&backend);
    let source = "Line one\n\n  * keep *this*  \n\tand {braces}";

    let result = translate(source, "French", &config).await.unwrap();
    assert_eq!(result.sanitized_content, "Bonjour");

    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert!(req.prompt.contains("French"));
    assert!(req.prompt.contains(source));
    assert_eq!(req.model, DEFAULT_MODEL);
    assert_eq!(req.temperature, TRANSLATION_TEMPERATURE);
}

#[tokio::test]
async fn test_blank_text_sends_zero_requests() {
    let backend = RecordingBackend::new("unused");
    let config = config_for(&backend);

    for blank in ["", "   ", "\n\t \n"] {
        let err = translate(blank, "Spanish", &config).await.unwrap_err();
        assert!(
            matches!(err, TranslateError::Validation(ValidationError::EmptySourceText)),
            "unexpected error for {blank:?}: {err}"
        );
    }
    assert_eq!(backend.count(), 0);
}

#[test]
fn test_sanitizer_examples() {
    assert_eq!(sanitize_markdown("```markdown\nHello\n```"), "Hello");
    assert_eq!(sanitize_markdown("Hello\nWorld"), "Hello\nWorld");
    let once = sanitize_markdown("```\n# Título\n\nTexto\n```");
    assert_eq!(sanitize_markdown(&once), once);
}

#[tokio::test]
async fn test_wrapped_reply_ending_in_code_block_is_unwrapped() {
    let backend = RecordingBackend::new("```markdown\n# Guía\n\nEjecute:\n\n```bash\nmake\n```\n```");
    let result = translate("# Guide\n\nRun:\n\n```bash\nmake\n```", "Spanish", &config_for(&backend))
        .await
        .unwrap();
    assert_eq!(result.sanitized_content, "# Guía\n\nEjecute:\n\n```bash\nmake\n```");
    assert!(!result.sanitized_content.starts_with("```"));
}

// ── Language preference ──────────────────────────────────────────────────────

#[test]
fn test_no_preference_selects_spanish() {
    let store = Arc::new(MemoryPreferenceStore::new());
    let selector = selector_with(&store);
    assert_eq!(selector.choice(), &LanguageChoice::Catalog("Spanish"));
}

#[tokio::test]
async fn test_french_then_custom_klingon_is_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preferences.json");
    FilePreferenceStore::new(&path)
        .set(SELECTED_LANGUAGE_KEY, "French")
        .unwrap();

    let store: Arc<dyn PreferenceStore> = Arc::new(FilePreferenceStore::new(&path));
    let mut selector = LanguageSelector::new(LanguageCatalog::default(), store);
    assert_eq!(selector.choice().selected_option(), "French");

    selector.select(CUSTOM_OPTION);
    selector.set_custom("Klingon");

    let backend = RecordingBackend::new("tlhIngan");
    let mut form = TranslationForm::new(config_for(&backend), selector);
    form.set_pasted_text("Hello");
    assert!(matches!(form.submit().await, SubmitOutcome::Translated(_)));

    let reopened = FilePreferenceStore::new(&path);
    assert_eq!(
        reopened.get(SELECTED_LANGUAGE_KEY).as_deref(),
        Some("Klingon")
    );
    assert!(backend.requests.lock().unwrap()[0]
        .prompt
        .contains("into Klingon"));

    let next = LanguageSelector::new(LanguageCatalog::default(), Arc::new(reopened));
    assert_eq!(next.choice().selected_option(), CUSTOM_OPTION);
    assert_eq!(next.choice().custom_text(), Some("Klingon"));
}

// ── Form scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_corrupt_upload_then_translate_is_validation_error() {
    let backend = RecordingBackend::new("unused");
    let store = Arc::new(MemoryPreferenceStore::new());
    let mut form = TranslationForm::new(config_for(&backend), selector_with(&store));

    let notice = form
        .upload(b"PK\x03\x04 definitely not a zip".to_vec(), "report.docx")
        .await
        .clone();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(notice.message.starts_with("Error converting file: "));
    assert!(notice.message.contains("report.docx"));
    assert_eq!(form.source_text(), "");
    assert!(!form.has_upload());

    match form.submit().await {
        SubmitOutcome::Rejected(e) => assert_eq!(e, ValidationError::EmptySourceText),
        other => panic!("expected a validation rejection, got {other:?}"),
    }
    assert_eq!(backend.count(), 0);
    assert_eq!(
        form.notices()[0].message,
        "Please provide some text to translate."
    );

    // The paste field still works after the failed upload.
    form.set_pasted_text("Good evening");
    assert!(matches!(form.submit().await, SubmitOutcome::Translated(_)));
    assert_eq!(backend.count(), 1);
}

#[tokio::test]
async fn test_docx_upload_is_translated() {
    let backend = RecordingBackend::new("```markdown\nBuenos días\n\nAdiós\n```");
    let store = Arc::new(MemoryPreferenceStore::new());
    let mut form = TranslationForm::new(config_for(&backend), selector_with(&store));

    let notice = form
        .upload(docx_bytes(&["Good morning", "Goodbye"]), "greeting.docx")
        .await
        .clone();
    assert_eq!(notice.kind, NoticeKind::Success);
    assert_eq!(notice.message, "File converted successfully!");
    assert_eq!(form.source_text(), "Good morning\n\nGoodbye");

    let result = match form.submit().await {
        SubmitOutcome::Translated(r) => r,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(result.sanitized_content, "Buenos días\n\nAdiós");
    assert_eq!(store.get(SELECTED_LANGUAGE_KEY).as_deref(), Some("Spanish"));
}

#[tokio::test]
async fn test_translate_document_unsupported_extension() {
    let backend = RecordingBackend::new("unused");
    let err = translate_document(b"\x7fELF", "tool.exe", "German", &config_for(&backend))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Extraction(ExtractionError::UnsupportedFormat { .. })
    ));
    assert_eq!(backend.count(), 0);
}

// ── OpenAI-compatible HTTP backend ───────────────────────────────────────────

#[tokio::test]
async fn test_http_backend_success() {
    let body = r#"{"choices":[{"message":{"role":"assistant","content":"```markdown\n# Hola\n```"}}],"usage":{"prompt_tokens":21,"completion_tokens":4}}"#;
    let (base_url, seen) = serve_once("200 OK", body).await;

    let result = translate("# Hello", "Spanish", &http_config(&base_url))
        .await
        .unwrap();
    assert_eq!(result.sanitized_content, "# Hola");
    assert_eq!(result.input_tokens, 21);
    assert_eq!(result.output_tokens, 4);

    let raw = seen.await.unwrap();
    assert!(raw.starts_with("POST /v1/chat/completions "));
    assert!(raw
        .to_ascii_lowercase()
        .contains("authorization: bearer sk-test-key"));

    let json_start = raw.find("\r\n\r\n").unwrap() + 4;
    let sent: serde_json::Value = serde_json::from_str(&raw[json_start..]).unwrap();
    assert_eq!(sent["model"], "gpt-4o-mini");
    assert_eq!(sent["messages"][0]["role"], "user");
    assert_eq!(
        sent["messages"][0]["content"],
        "Translate the following text into Spanish and format the result in Markdown:\n\n# Hello"
    );
    assert!((sent["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn test_http_backend_auth_error_becomes_notice() {
    let body = r#"{"error":{"message":"Incorrect API key provided: sk-test***","type":"invalid_request_error"}}"#;
    let (base_url, _seen) = serve_once("401 Unauthorized", body).await;

    let store = Arc::new(MemoryPreferenceStore::new());
    let mut form = TranslationForm::new(http_config(&base_url), selector_with(&store));
    form.set_pasted_text("Hello");

    assert!(matches!(form.submit().await, SubmitOutcome::Failed));
    let notice = &form.notices()[0];
    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(notice.message.starts_with("An error occurred: "));
    assert!(notice.message.contains("Incorrect API key provided"));
}

#[tokio::test]
async fn test_http_backend_rate_limit_reads_retry_after() {
    let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
    let (base_url, _seen) =
        serve_once_with_headers("429 Too Many Requests", &[("Retry-After", "7")], body).await;

    let err = translate("Hello", "Korean", &http_config(&base_url))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            TranslateError::Transport(TransportError::RateLimited {
                retry_after_secs: Some(7)
            })
        ),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_http_backend_server_error_maps_status() {
    let body = r#"{"error":{"message":"The server is overloaded","type":"server_error"}}"#;
    let (base_url, _seen) = serve_once("503 Service Unavailable", body).await;

    let err = translate("Hello", "Russian", &http_config(&base_url))
        .await
        .unwrap_err();
    match err {
        TranslateError::Transport(ref t @ TransportError::Http { status, ref detail }) => {
            assert_eq!(status, 503);
            assert_eq!(detail, "The server is overloaded");
            assert!(t.is_transient());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_http_backend_malformed_body() {
    let (base_url, _seen) = serve_once("200 OK", r#"{"choices":[]}"#).await;
    let err = translate("Hello", "Italian", &http_config(&base_url))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Transport(TransportError::MalformedResponse { .. })
    ));
}

// ── Retry ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transient_failure_is_retried() {
    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _req: &ChatRequest) -> Result<ChatCompletion, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::Http {
                    status: 503,
                    detail: "upstream overloaded".into(),
                })
            } else {
                Ok(ChatCompletion {
                    content: "Olá".into(),
                    ..Default::default()
                })
            }
        }
    }

    let backend = Arc::new(Flaky {
        calls: AtomicUsize::new(0),
    });
    let config = TranslatorConfig::builder()
        .backend(backend.clone() as Arc<dyn ChatBackend>)
        .retry_backoff_ms(10)
        .build()
        .unwrap();

    let result = translate("Hello", "Portuguese", &config).await.unwrap();
    assert_eq!(result.sanitized_content, "Olá");
    assert_eq!(result.retries, 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

// ── Live tests ───────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED and OPENAI_API_KEY are both set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match TranslatorConfig::from_env() {
            Ok(c) if c.api_key.is_some() => c,
            _ => {
                println!("SKIP — OPENAI_API_KEY is not set");
                return;
            }
        }
    }};
}

#[tokio::test]
async fn test_live_translate_short_text() {
    let config = e2e_skip_unless_ready!();
    let result = translate(
        "# Opening hours\n\nThe library is open from 9am to 5pm.",
        "Spanish",
        &config,
    )
    .await
    .unwrap();

    println!("{}", result.sanitized_content);
    assert!(!result.sanitized_content.trim().is_empty());
    assert!(!result.sanitized_content.starts_with("```"));
    assert!(result.input_tokens > 0);
}

#[tokio::test]
async fn test_live_translate_docx() {
    let config = e2e_skip_unless_ready!();
    let bytes = docx_bytes(&["Welcome to the community centre.", "Please sign in at the desk."]);
    let result = translate_document(&bytes, "welcome.docx", "Vietnamese", &config)
        .await
        .unwrap();

    println!("{}", result.sanitized_content);
    assert!(!result.sanitized_content.trim().is_empty());
}
