//! # edgequake-pdf2img
//!
//! Turn the pages of a PDF into individually rendered raster images, let the
//! caller pick which ones to keep, and package the chosen pages into a single
//! zip archive.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL, reject non-PDFs
//!  ├─ 2. Document   open with pdfium (page count + page geometry)
//!  ├─ 3. Select     all pages, or a range such as "1-3, 5"
//!  ├─ 4. Preview    lazy low-res thumbnails, at most one render per page
//!  ├─ 5. Export     full-res renders, strictly one page at a time
//!  └─ 6. Archive    completed + still-selected pages → {name}_exported.zip
//! ```
//!
//! Rendering failures stay on the page that failed; the run keeps going and
//! the page can be retried. Only a document that disappears mid-run or a
//! failing archive writer end a run early.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2img::{convert_to_file, ConversionConfig, ImageFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .format(ImageFormat::Png)
//!         .pages("1-3, 5")
//!         .build()?;
//!     let (path, stats) = convert_to_file("document.pdf", ".", &config).await?;
//!     eprintln!("{} pages → {}", stats.archived_pages, path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Interactive use
//!
//! [`Session`] keeps one document open with its selection, settings,
//! thumbnail loader and export run, for callers that preview pages, toggle
//! them and retry failures before packaging.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2img` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2img = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod selection;
pub mod session;
pub mod stream;
pub mod thumbnails;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{ArchiveEntry, ArchiveError, ArchiveWriter, ZipArchiveWriter};
pub use config::{
    ConversionConfig, ConversionConfigBuilder, ConversionSettings, ConversionSettingsBuilder,
    ExportScope, ImageFormat, RenderScale,
};
pub use convert::{
    convert, convert_document, convert_from_bytes, convert_sync, convert_to_file, inspect,
    save_archive,
};
pub use error::{EngineError, PageError, Pdf2ImgError};
pub use export::{CancelFlag, ConversionRun, ExportPipeline, RunOutcome, Step};
pub use naming::{LlmNameSuggester, NameSuggester};
pub use output::{
    ArchivePayload, ConversionOutput, ConversionStats, DocumentInfo, PageArtifact, PageStatus,
    PageSummary,
};
pub use pipeline::document::{PageSize, PageSource, PdfiumDocument, Viewport};
pub use pipeline::render::{render_page, QualitySpec, QualityTier};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
pub use selection::{parse_range, SelectionSet};
pub use session::{Session, SessionPhase};
pub use stream::{convert_stream, progress_channel, EventStream, ExportEvent};
pub use thumbnails::{PreviewHandle, ProximityWindow, ThumbnailLoader, ThumbnailState};
