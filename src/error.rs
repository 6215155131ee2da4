//! Error types for the edgequake-pdf2img library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Pdf2ImgError`]: **Fatal**: the input was rejected before any pipeline
//!   state exists (not a PDF, wrong password), or a whole export run cannot
//!   continue (document became unreadable, archive assembly failed).
//!   Returned as `Err(Pdf2ImgError)`.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed to render or encode.
//!   Stored on the [`crate::output::PageArtifact`] so the run continues and
//!   the page can be retried later.
//!
//! * [`EngineError`]: what a document engine reports back to the rendering
//!   adapter. The adapter folds it into a [`PageError`]; it never escapes
//!   past the adapter as an `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2img library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageArtifact`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2ImgError {
    // ── Input rejection ─────────────────────────────────────────────────
    /// Nothing exists at the given path.
    #[error("No such PDF: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The file exists but this process may not read it.
    #[error("Cannot read '{path}': permission denied")]
    PermissionDenied { path: PathBuf },

    /// Blank input or a directory.
    #[error("'{input}' is neither a PDF file nor an HTTP(S) URL")]
    InvalidInput { input: String },

    /// The URL could not be fetched (network error or non-2xx status).
    #[error("Could not fetch '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The URL did not answer within the download timeout.
    #[error("Fetching '{url}' took longer than {secs}s (see --download-timeout)")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes do not start with `%PDF`.
    #[error("'{path}' is not a PDF (starts with {magic:02x?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The file is larger than the configured input limit.
    #[error("PDF '{path}' is {size_mb:.1} MB, above the {limit_mb} MB limit")]
    FileTooLarge {
        path: PathBuf,
        size_mb: f64,
        limit_mb: u64,
    },

    // ── Document loading ────────────────────────────────────────────────
    /// pdfium could not parse the file.
    #[error("'{path}' could not be opened as a PDF: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The document is encrypted and no password was given.
    #[error("'{path}' is password protected (pass --password)")]
    PasswordRequired { path: PathBuf },

    #[error("The password given for '{path}' is not correct")]
    WrongPassword { path: PathBuf },

    /// The document opened fine but has no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    // ── Run errors ────────────────────────────────────────────────────────
    /// A target page number is outside `[1, total]`.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// No completed page is selected at hand-off time, or the run has no targets.
    #[error("Nothing to export: {reason}")]
    NothingToExport { reason: String },

    /// Settings or document changes were attempted while a run is active.
    #[error("An export run is in progress; wait for it to finish or cancel it first")]
    RunInProgress,

    /// An operation needs a conversion run but none exists.
    #[error("No conversion run has been started for this document")]
    NoActiveRun,

    /// Retry was requested for a page that has not been processed by the run.
    #[error("Page {page} has not been processed by this run and cannot be retried")]
    NotRetryable { page: usize },

    /// The source document stopped being readable in the middle of a run.
    #[error("Document became unreadable while rendering page {page}: {detail}")]
    DocumentUnreadable { page: usize, detail: String },

    /// The archive writer failed; no partial archive was produced.
    #[error("Archive assembly failed: {0}")]
    ArchiveFailed(String),

    // ── Output ──────────────────────────────────────────────────────────
    /// Writing a file (the archive or a downloaded temp copy) failed.
    #[error("Could not write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Setup ───────────────────────────────────────────────────────────
    #[error("Bad configuration: {0}")]
    InvalidConfig(String),

    /// No usable pdfium shared library was found.
    #[error(
        "pdfium is not available: {0}\n\
Point PDFIUM_LIB_PATH at libpdfium, or put the library next to the \
pdf2img executable or on the system library path."
    )]
    PdfiumBindingFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored on [`crate::output::PageArtifact`] when a page fails. The run
/// continues with the next page unless the error is
/// [`PageError::DocumentUnavailable`].
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The engine could not load or draw the page.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The page was drawn but the raster encoder rejected it.
    #[error("Page {page}: encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The whole document stopped being readable while this page rendered.
    #[error("Page {page}: document unavailable: {detail}")]
    DocumentUnavailable { page: usize, detail: String },
}

impl PageError {
    /// Page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::DocumentUnavailable { page, .. } => *page,
        }
    }

    /// Whether the failure affects the whole document rather than one page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PageError::DocumentUnavailable { .. })
    }
}

/// Failure reported by a [`crate::pipeline::document::PageSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// This page could not be loaded or drawn; other pages may be fine.
    #[error("{0}")]
    Page(String),

    /// The document itself can no longer be read.
    #[error("{0}")]
    DocumentUnavailable(String),
}

impl EngineError {
    /// Attach the page number and turn this into a [`PageError`].
    pub fn into_page_error(self, page: usize) -> PageError {
        match self {
            EngineError::Page(detail) => PageError::RenderFailed { page, detail },
            EngineError::DocumentUnavailable(detail) => {
                PageError::DocumentUnavailable { page, detail }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_out_of_range_display() {
        let e = Pdf2ImgError::PageOutOfRange { page: 12, total: 10 };
        let msg = e.to_string();
        assert!(msg.contains("12"), "got: {msg}");
        assert!(msg.contains("10 pages"), "got: {msg}");
    }

    #[test]
    fn archive_failed_is_verbatim() {
        let e = Pdf2ImgError::ArchiveFailed("disk full".into());
        assert!(e.to_string().ends_with("disk full"));
    }

    #[test]
    fn file_too_large_display() {
        let e = Pdf2ImgError::FileTooLarge {
            path: PathBuf::from("big.pdf"),
            size_mb: 72.25,
            limit_mb: 50,
        };
        let msg = e.to_string();
        assert!(msg.contains("72.2") || msg.contains("72.3"), "got: {msg}");
        assert!(msg.contains("50 MB"), "got: {msg}");
    }

    #[test]
    fn engine_error_maps_to_page_error() {
        let page = EngineError::Page("bad xobject".into()).into_page_error(4);
        assert_eq!(page.page(), 4);
        assert!(!page.is_fatal());

        let fatal = EngineError::DocumentUnavailable("closed".into()).into_page_error(7);
        assert_eq!(fatal.page(), 7);
        assert!(fatal.is_fatal());
    }
}
