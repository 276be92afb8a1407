//! Prompt text sent alongside each page image.
//!
//! Callers override it per session via [`crate::config::ProcessingConfig::default_prompt`] or per
//! call via the `prompt` argument of [`crate::service::DocumentService`].

/// Default recognition prompt.
pub const DEFAULT_PROMPT: &str = "Extract all text content from this document, including tables, \
headings and body text, and output it as Markdown that preserves the original structure and formatting.";

/// Pick the per-call prompt if given and non-blank, else the session default.
pub fn resolve_prompt<'a>(prompt: Option<&'a str>, default_prompt: &'a str) -> &'a str {
    match prompt {
        Some(p) if !p.trim().is_empty() => p,
        _ => default_prompt,
    }
}
