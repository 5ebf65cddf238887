//! Error types for the edgequake-pdfpress library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfPressError`] — **Fatal**: the run cannot produce its output
//!   (unreadable input, corrupt page during compress or merge, serialisation
//!   failure, cancellation). Returned as `Err(PdfPressError)` from the
//!   top-level entry points. No partial document is ever returned with it.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed in a mode where
//!   every page is an independent output (split). Collected into
//!   [`crate::output::RunOutput::failures`] next to the pages that did
//!   succeed.
//!
//! Nothing in the pipeline retries. Rendering and copying failures are
//! deterministic for a given input, so the caller re-triggers the run if it
//! wants another attempt.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfpress library.
#[derive(Debug, Error)]
pub enum PdfPressError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The buffer was read, but it does not start with the PDF header.
    #[error("'{name}' is not a PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── Document errors ───────────────────────────────────────────────────
    /// The document cannot be parsed, or cannot be opened even with the
    /// empty-password fallback.
    #[error("Cannot decode PDF '{name}': {detail}")]
    Decode { name: String, detail: String },

    /// The user password is missing or did not verify.
    #[error("PDF '{name}' is encrypted and the password is missing or wrong.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A page index outside `[0, page_count)` was requested.
    #[error("Page index {index} is out of range (document has {total} pages)")]
    PageOutOfRange { index: usize, total: usize },

    /// A page failed in a mode where any page failure is fatal.
    #[error("Page {page} of '{name}' failed: {detail}")]
    Render {
        name: String,
        page: usize,
        detail: String,
    },

    /// Every selected page failed in split mode, so nothing was produced.
    #[error("All {total} selected pages failed. First error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// Final assembly of the output document failed.
    #[error("Failed to serialise output document: {0}")]
    Serialize(String),

    /// The input exceeds a configured resource limit.
    #[error("Resource limit exceeded: {what} is {actual}, limit is {limit}")]
    ResourceLimit {
        what: &'static str,
        actual: u64,
        limit: u64,
    },

    /// The run was cancelled between pages.
    #[error("Run cancelled after {completed}/{total} pages")]
    Cancelled { completed: usize, total: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or run-argument validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Rasterising pages requires the pdfium shared library.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Or place libpdfium next to the binary / in the working directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfPressError {
    /// Whether this error was caused by cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PdfPressError::Cancelled { .. })
    }
}

/// A non-fatal error for a single page.
///
/// Page numbers are 1-indexed, matching what users see in a viewer.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Encoding the rendered surface failed.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// Structural copy of the page failed (dangling reference, bad page tree).
    #[error("Page {page}: copy failed: {detail}")]
    CopyFailed { page: usize, detail: String },

    /// Serialising the single-page output failed.
    #[error("Page {page}: serialisation failed: {detail}")]
    SerializeFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::CopyFailed { page, .. }
            | PageError::SerializeFailed { page, .. } => *page,
        }
    }

    /// Promote a page failure to a fatal error for document `name`.
    pub fn into_fatal(self, name: &str) -> PdfPressError {
        let page = self.page();
        let detail = match self {
            PageError::RenderFailed { detail, .. }
            | PageError::EncodeFailed { detail, .. }
            | PageError::CopyFailed { detail, .. }
            | PageError::SerializeFailed { detail, .. } => detail,
        };
        PdfPressError::Render {
            name: name.to_string(),
            page,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_limit_display() {
        let e = PdfPressError::ResourceLimit {
            what: "input size",
            actual: 300,
            limit: 200,
        };
        let msg = e.to_string();
        assert!(msg.contains("input size"), "got: {msg}");
        assert!(msg.contains("300"));
    }

    #[test]
    fn cancelled_is_flagged() {
        let e = PdfPressError::Cancelled {
            completed: 2,
            total: 5,
        };
        assert!(e.is_cancelled());
        assert!(e.to_string().contains("2/5"));
        assert!(!PdfPressError::Serialize("oom".into()).is_cancelled());
    }

    #[test]
    fn page_error_promotes_to_render_error() {
        let e = PageError::CopyFailed {
            page: 3,
            detail: "object 99 0 R not found".into(),
        };
        assert_eq!(e.page(), 3);
        match e.into_fatal("report.pdf") {
            PdfPressError::Render { name, page, detail } => {
                assert_eq!(name, "report.pdf");
                assert_eq!(page, 3);
                assert!(detail.contains("99"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::RenderFailed {
            page: 1,
            detail: "bad xobject".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("RenderFailed"));
    }
}
