//! Pipeline stages for document translation.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ (prompt) ──▶ llm ──▶ postprocess
//! (upload)                 (chat)  (fences)
//! ```
//!
//! 1. [`extract`]: stage an upload in a scoped temp file and turn it into
//!    text; runs in `spawn_blocking` because archive parsing is CPU-bound
//! 2. [`llm`]: one chat-completion request with timeout and
//!    retry/backoff; the only stage with network I/O
//! 3. [`postprocess`]: strip the fence pair models wrap Markdown in
//!
//! Prompt construction lives in [`crate::prompts`].

pub mod extract;
pub mod llm;
pub mod postprocess;
