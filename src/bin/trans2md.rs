//! CLI binary for edgequake-translate.
//!
//! A thin shim over the library crate: maps CLI flags to
//! `TranslatorConfig`, feeds the input into a `TranslationForm` and prints
//! the resulting Markdown or notices.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_translate::config::{DEFAULT_BASE_URL, DEFAULT_MODEL, ENV_API_KEY};
use edgequake_translate::{
    FilePreferenceStore, LanguageCatalog, LanguageChoice, LanguageSelector, MemoryPreferenceStore,
    Notice, PreferenceStore, ProgressCallback, SubmitOutcome, TranslationForm,
    TranslationProgressCallback, TranslatorConfig, CUSTOM_OPTION,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Busy spinner shown while a file is converted and the request is in
/// flight.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, filename: &str, size_bytes: usize) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!("{filename} ({size_bytes} bytes)"));
    }

    fn on_extraction_complete(&self, filename: &str, text_len: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            filename,
            dim(&format!("{text_len} chars"))
        ));
    }

    fn on_extraction_error(&self, filename: &str, _error: &str) {
        self.bar.println(format!("  {} {}", red("✗"), filename));
    }

    fn on_request_start(&self, model: &str, target_language: &str) {
        self.bar.set_prefix("Translating");
        self.bar.set_message(format!("into {target_language} with {model}"));
    }

    fn on_retry(&self, attempt: u32, max_retries: u32, error: &str, backoff_ms: u64) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} retry {}/{} in {}ms  {}",
            cyan("⚠"),
            attempt,
            max_retries,
            backoff_ms,
            dim(&msg)
        ));
    }

    fn on_translation_complete(&self, _markdown_len: usize) {
        self.bar.finish_and_clear();
    }

    fn on_translation_error(&self, _error: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate a Word document into the remembered language (Spanish at first)
  trans2md --file report.docx

  # Paste text, pick a language
  trans2md --text "Where is the train station?" --language french

  # Pipe text in, write the Markdown to a file
  cat notes.md | trans2md --language "Haitian Creole" -o notes.ht.md

  # A language that is not in the list
  trans2md --file slides.pptx --custom-language Klingon

  # JSON output with token counts
  trans2md --file data.xlsx --language German --json

  # Another provider through edgequake-llm
  trans2md --provider anthropic --model claude-3-5-haiku-latest --text "Hello"

  # Show the language list and the remembered default
  trans2md --list-languages

SUPPORTED INPUT:
  .txt .md .csv .json .html .xml .yaml … (UTF-8 text)
  .docx (Word)   .pptx (PowerPoint)   .xlsx (Excel)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key for the default OpenAI-compatible backend
  OPENAI_API_URL          API root (default: https://api.openai.com/v1)
  OPENAI_MODEL            Model ID (default: gpt-4o-mini)
  EDGEQUAKE_LLM_PROVIDER  Use an edgequake-llm provider instead (anthropic, gemini, ollama, …)
  TRANS2MD_PREFS          Preferences file (default: <config dir>/edgequake-translate/preferences.json)
  RUST_LOG                Log filter, overrides -v / -q

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Translate:       trans2md --file document.docx -o document.es.md
"#;

/// Translate documents and pasted text into Markdown using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "trans2md",
    version,
    about = "Translate documents and pasted text into Markdown using LLMs",
    long_about = "Translate an uploaded document (docx, pptx, xlsx, text) or pasted text into a \
target language and print the result as Markdown. Works with OpenAI and any OpenAI-compatible \
endpoint, or any provider supported by edgequake-llm.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to translate. Its text replaces any pasted text.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Text to translate (read from stdin when neither --file nor --text is given).
    #[arg(short, long)]
    text: Option<String>,

    /// Target language from the list (case-insensitive), or any other name.
    #[arg(short, long, env = "TRANS2MD_LANGUAGE")]
    language: Option<String>,

    /// Free-text target language; same as --language "Other (Custom)".
    #[arg(long, conflicts_with = "language")]
    custom_language: Option<String>,

    /// Print the language list and exit.
    #[arg(long)]
    list_languages: bool,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "TRANS2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Output structured JSON (TranslationResult) instead of Markdown.
    #[arg(long, env = "TRANS2MD_JSON")]
    json: bool,

    /// Chat model ID.
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider name (anthropic, gemini, ollama, azure, …).
    #[arg(
        long,
        env = "EDGEQUAKE_LLM_PROVIDER",
        long_help = "Send the request through an edgequake-llm provider instead of the \
          OpenAI-compatible endpoint. The provider reads its own API key variable."
    )]
    provider: Option<String>,

    /// OpenAI-compatible API root.
    #[arg(long, env = "OPENAI_API_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Max output tokens for the reply (provider default when unset).
    #[arg(long, env = "TRANS2MD_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Per-attempt request timeout in seconds.
    #[arg(long, env = "TRANS2MD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries on transient failures (timeouts, 5xx, 429).
    #[arg(long, env = "TRANS2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Preferences file holding the remembered language.
    #[arg(long, env = "TRANS2MD_PREFS")]
    prefs: Option<PathBuf>,

    /// Disable the progress spinner.
    #[arg(long, env = "TRANS2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TRANS2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TRANS2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep INFO logs quiet
    // while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_languages;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store = open_preferences(&cli);
    let catalog = LanguageCatalog::default();

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list_languages {
        let selector = LanguageSelector::new(catalog, store);
        let current = selector.choice().selected_option().to_string();
        for option in catalog.options() {
            if option == current {
                println!("{} {}", green("●"), bold(option));
            } else {
                println!("  {option}");
            }
        }
        if let Some(custom) = selector.choice().custom_text() {
            println!("\n  remembered custom language: {}", bold(custom));
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn TranslationProgressCallback>),
    )?;

    let mut selector = LanguageSelector::new(catalog, store);
    if let Some(ref label) = cli.language {
        if label == CUSTOM_OPTION {
            selector.select(CUSTOM_OPTION);
        } else {
            selector.set_choice(LanguageChoice::from_user_input(&catalog, label));
        }
    }
    if let Some(ref custom) = cli.custom_language {
        selector.set_custom(custom.clone());
    }

    let mut form = TranslationForm::new(config, selector);

    // ── Input ────────────────────────────────────────────────────────────
    if let Some(ref text) = cli.text {
        form.set_pasted_text(text.clone());
    } else if cli.file.is_none() && !io::stdin().is_terminal() {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read text from stdin")?;
        form.set_pasted_text(buf);
    }

    if let Some(ref path) = cli.file {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let notice = form.upload(bytes, &filename).await.clone();
        print_notice(&notice, &progress, cli.quiet);
    }

    // ── Translate ────────────────────────────────────────────────────────
    let outcome = form.submit().await;
    if let Some(ref cb) = progress {
        cb.finish();
    }

    let result = match outcome {
        SubmitOutcome::Translated(result) => result,
        SubmitOutcome::Rejected(_) | SubmitOutcome::Failed => {
            for notice in form.notices() {
                print_notice(notice, &None, false);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
        println!("{json}");
    } else if let Some(ref output_path) = cli.output {
        edgequake_translate::translate::write_markdown(output_path, &result.sanitized_content)
            .await
            .context("Failed to write output")?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.sanitized_content.as_bytes())
            .context("Failed to write to stdout")?;
        // Ensure a trailing newline on stdout.
        if !result.sanitized_content.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        let target = match cli.output {
            Some(ref p) => format!("  →  {}", bold(&p.display().to_string())),
            None => String::new(),
        };
        eprintln!(
            "{}  {}  {}ms{}",
            green("✔"),
            result.target_language,
            result.duration_ms,
            target
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&result.input_tokens.to_string()),
            dim(&result.output_tokens.to_string()),
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Map CLI args to `TranslatorConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranslatorConfig> {
    let mut builder = TranslatorConfig::builder()
        .base_url(cli.base_url.clone())
        .model(cli.model.clone())
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries);

    if let Some(key) = std::env::var(ENV_API_KEY).ok().filter(|k| !k.trim().is_empty()) {
        builder = builder.api_key(key);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// The `--prefs` file, the per-user default, or memory when neither exists.
fn open_preferences(cli: &Cli) -> Arc<dyn PreferenceStore> {
    match cli.prefs.clone().or_else(FilePreferenceStore::default_path) {
        Some(path) => Arc::new(FilePreferenceStore::new(path)),
        None => Arc::new(MemoryPreferenceStore::new()),
    }
}

fn print_notice(notice: &Notice, progress: &Option<Arc<CliProgressCallback>>, quiet: bool) {
    let line = if notice.is_error() {
        format!("{} {}", red("✘"), notice.message)
    } else if quiet {
        return;
    } else {
        format!("{} {}", green("✔"), notice.message)
    };
    match progress {
        Some(cb) => cb.bar.println(line),
        None => eprintln!("{line}"),
    }
}
