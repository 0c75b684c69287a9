//! Post-processing: strip the code fence models wrap their answer in.
//!
//! The prompt asks for Markdown, and many models answer with
//!
//! ````text
//! ```markdown
//! # Titre
//! ...
//! ```
//! ````
//!
//! which would render as a literal code block. [`sanitize_markdown`] removes
//! one opening fence at the very start (optionally tagged with a language)
//! and one closing fence at the very end. Everything in between is left
//! byte-for-byte intact.
//!
//! A closing fence is only treated as a wrapper when the opening one was
//! stripped, or when it has no partner (an odd number of fence lines). A
//! reply that simply ends with its own code block keeps that block closed.
//!
//! ## Idempotence
//!
//! `sanitize_markdown(sanitize_markdown(x)) == sanitize_markdown(x)` holds
//! for every input. When peeling one layer would expose another fence that a
//! second pass would peel (nested wrappers, a fence directly inside a fence),
//! the input is returned trimmed but otherwise untouched rather than stripped
//! twice.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OPENING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:\w+)?\n").unwrap());

static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n```$").unwrap());

/// Remove a wrapping fence pair from raw model output.
///
/// Surrounding whitespace is trimmed before and after stripping.
pub fn sanitize_markdown(raw: &str) -> String {
    let once = strip_outer_fences(raw);
    if strip_outer_fences(&once) == once {
        once
    } else {
        raw.trim().to_string()
    }
}

/// Single stripping pass: trim, drop one opening fence, drop one unmatched
/// closing fence, trim.
fn strip_outer_fences(input: &str) -> String {
    let s = input.trim();
    let (s, opened) = match RE_OPENING_FENCE.find(s) {
        Some(m) => (&s[m.end()..], true),
        None => (s, false),
    };
    let s = match RE_CLOSING_FENCE.find(s) {
        Some(m) if opened || fence_lines(s) % 2 == 1 => &s[..m.start()],
        _ => s,
    };
    s.trim().to_string()
}

fn fence_lines(s: &str) -> usize {
    s.lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count()
}
