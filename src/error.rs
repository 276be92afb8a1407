//! Error types for the docparse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocParseError`] (**fatal**): the document cannot be processed at all
//!   (missing file, unsupported type, unreadable PDF, bad configuration) or
//!   the batch as a whole failed. Returned as `Err(DocParseError)`.
//!
//! * [`PageError`] (**per page**): one page's recognition call failed. It is
//!   stored inside [`crate::output::PageResult`] as data, never raised, so one
//!   page's failure cannot abort the sibling workers still in flight. The
//!   orchestrator turns the first failing page (by index) into
//!   [`DocParseError::BatchFailed`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the docparse library.
#[derive(Debug, Error)]
pub enum DocParseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The path exists but is a directory or special file.
    #[error("Path is not a file: '{path}'")]
    NotAFile { path: PathBuf },

    /// The file extension is not one of the configured supported extensions.
    #[error("Unsupported file type '{extension}' for '{path}'")]
    UnsupportedFileType { path: PathBuf, extension: String },

    /// The file has a `.pdf` extension but does not start with `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The rasteriser failed on a specific page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Recognition errors ────────────────────────────────────────────────
    /// The configured provider could not be set up (missing API key etc.).
    #[error("Recognition provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// At least one page failed; `page` is the 1-indexed number of the
    /// lowest failing page.
    #[error("page {page} failed: {detail}")]
    BatchFailed { page: usize, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The `Display` output is the human-readable cause text used in the batch
/// failure message, so it never repeats the page number.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The recognition backend returned an error.
    #[error("{detail}")]
    Recognition { detail: String },

    /// The recognition call exceeded the per-call timeout.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    /// The worker task panicked before producing a result.
    #[error("worker panicked: {detail}")]
    Panicked { detail: String },

    /// No result was ever reported for this page.
    #[error("no result was reported for this page")]
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_failed_display() {
        let e = DocParseError::BatchFailed {
            page: 3,
            detail: "HTTP 503: overloaded".into(),
        };
        assert_eq!(e.to_string(), "page 3 failed: HTTP 503: overloaded");
    }

    #[test]
    fn unsupported_type_display() {
        let e = DocParseError::UnsupportedFileType {
            path: PathBuf::from("notes.docx"),
            extension: ".docx".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".docx"), "got: {msg}");
        assert!(msg.contains("notes.docx"), "got: {msg}");
    }

    #[test]
    fn page_error_display_has_no_page_number() {
        let e = PageError::Recognition {
            detail: "connection reset".into(),
        };
        assert_eq!(e.to_string(), "connection reset");
        assert_eq!(
            PageError::Timeout {
                after: Duration::from_secs(30)
            }
            .to_string(),
            "request timed out after 30s"
        );
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::Timeout {
            after: Duration::from_millis(250),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
